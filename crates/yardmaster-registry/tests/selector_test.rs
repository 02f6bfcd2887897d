//! Integration tests for image selection against the in-memory registry.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use yardmaster_core::{ImageSelectionStrategy, ImageSubscription};
use yardmaster_registry::oci::Platform;
use yardmaster_registry::{
    tag_caching_enabled, DiscoveryPool, Image, ImageCache, MemoryBackend, MemoryImage,
    PlatformConstraint, PlatformVariant, RateLimitConfig, RateLimiter, RepositoryClient,
    SelectorDeps, SelectorRegistry,
};

const REPO: &str = "ghcr.io/acme/api";

fn limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(&RateLimitConfig::new(1000)))
}

fn arm_only() -> MemoryBackend {
    MemoryBackend::new().with_index(
        "1.0.0",
        "sha256:index",
        vec![MemoryImage::new("sha256:arm", None).with_platform(Platform::new("linux", "arm64"))],
    )
}

async fn select(
    backend: Arc<MemoryBackend>,
    cache: ImageCache,
    subscription: &ImageSubscription,
) -> Vec<Image> {
    let client = RepositoryClient::new(REPO, backend, cache, limiter())
        .with_tag_caching(tag_caching_enabled(subscription));
    let deps = SelectorDeps {
        client,
        pool: DiscoveryPool::new(8),
    };
    SelectorRegistry::with_builtins()
        .unwrap()
        .new_selector(subscription, deps)
        .unwrap()
        .select(&CancellationToken::new())
        .await
        .unwrap()
}

// =============================================================================
// Platform Filtering
// =============================================================================

#[tokio::test]
async fn test_platform_mismatch_excluded_on_fresh_resolution() {
    let client = RepositoryClient::new(REPO, Arc::new(arm_only()), ImageCache::default(), limiter())
        .with_tag_caching(true);
    let amd: PlatformConstraint = "linux/amd64".parse().unwrap();

    let image = client
        .get_image_by_tag("1.0.0", Some(&amd), &CancellationToken::new())
        .await
        .unwrap();
    assert!(image.is_none());
}

#[tokio::test]
async fn test_platform_mismatch_excluded_on_cache_hit() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = ImageCache::default();
    cache.insert(
        format!("{REPO}:1.0.0"),
        Image {
            digest: "sha256:index".to_string(),
            platforms: vec![PlatformVariant {
                os: "linux".to_string(),
                arch: "arm64".to_string(),
                ..PlatformVariant::default()
            }],
            ..Image::default()
        },
    );
    let client = RepositoryClient::new(REPO, backend.clone(), cache, limiter())
        .with_tag_caching(true);
    let cancel = CancellationToken::new();

    let amd: PlatformConstraint = "linux/amd64".parse().unwrap();
    assert!(client
        .get_image_by_tag("1.0.0", Some(&amd), &cancel)
        .await
        .unwrap()
        .is_none());

    let arm: PlatformConstraint = "linux/arm64".parse().unwrap();
    let image = client
        .get_image_by_tag("1.0.0", Some(&arm), &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(image.digest, "sha256:index");
    // Both answers came from the cache.
    assert_eq!(backend.manifest_fetch_count(), 0);
}

#[tokio::test]
async fn test_semver_platform_filter_skips_tag() {
    let backend = Arc::new(arm_only());
    backend.push_image(
        "0.9.0",
        MemoryImage::new("sha256:old", None).with_platform(Platform::new("linux", "amd64")),
    );
    let sub = ImageSubscription::new(REPO).with_platform("linux/amd64");

    let images = select(backend, ImageCache::default(), &sub).await;
    let tags: Vec<_> = images.iter().map(|i| i.tag.as_str()).collect();
    assert_eq!(tags, vec!["0.9.0"]);
}

// =============================================================================
// Caching
// =============================================================================

#[tokio::test]
async fn test_digest_lookup_fetches_once() {
    let backend = Arc::new(
        MemoryBackend::new().with_image("1.0.0", MemoryImage::new("sha256:abc", None)),
    );
    let client = RepositoryClient::new(REPO, backend.clone(), ImageCache::default(), limiter());
    let cancel = CancellationToken::new();

    let first = client.get_image_by_digest("sha256:abc", &cancel).await.unwrap();
    let second = client.get_image_by_digest("sha256:abc", &cancel).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(backend.manifest_fetch_count(), 1);
    assert_eq!(backend.config_fetch_count(), 1);
}

#[tokio::test]
async fn test_cache_shared_between_clients() {
    let backend = Arc::new(
        MemoryBackend::new().with_image("1.0.0", MemoryImage::new("sha256:abc", None)),
    );
    let cache = ImageCache::default();
    let cancel = CancellationToken::new();

    let a = RepositoryClient::new(REPO, backend.clone(), cache.clone(), limiter());
    let b = RepositoryClient::new(REPO, backend.clone(), cache, limiter());
    a.get_image_by_digest("sha256:abc", &cancel).await.unwrap();
    b.get_image_by_digest("sha256:abc", &cancel).await.unwrap();

    assert_eq!(backend.manifest_fetch_count(), 1);
}

#[tokio::test]
async fn test_digest_strategy_sees_retagged_image() {
    let backend = Arc::new(
        MemoryBackend::new().with_image("stable", MemoryImage::new("sha256:one", None)),
    );
    let cache = ImageCache::default();
    let mut sub = ImageSubscription::new(REPO)
        .with_strategy(ImageSelectionStrategy::Digest)
        .with_constraint("stable");
    sub.cache_by_tag = true;

    let first = select(Arc::clone(&backend), cache.clone(), &sub).await;
    assert_eq!(first[0].digest, "sha256:one");

    backend.push_image("stable", MemoryImage::new("sha256:two", None));
    let second = select(backend, cache, &sub).await;
    assert_eq!(second[0].digest, "sha256:two");
}

// =============================================================================
// Strategies
// =============================================================================

#[tokio::test]
async fn test_digest_missing_tag_is_empty() {
    let backend = Arc::new(
        MemoryBackend::new().with_image("latest", MemoryImage::new("sha256:abc", None)),
    );
    let sub = ImageSubscription::new(REPO)
        .with_strategy(ImageSelectionStrategy::Digest)
        .with_constraint("missing-tag");

    assert!(select(backend, ImageCache::default(), &sub).await.is_empty());
}

#[tokio::test]
async fn test_newest_build_prefers_recent_images() {
    let day = |d| Utc.with_ymd_and_hms(2024, 5, d, 0, 0, 0).single();
    let backend = Arc::new(
        MemoryBackend::new()
            .with_image("build-a", MemoryImage::new("sha256:a", day(1)))
            .with_image("build-b", MemoryImage::new("sha256:b", day(9)))
            .with_image("build-c", MemoryImage::new("sha256:c", day(9)))
            .with_image("build-d", MemoryImage::new("sha256:d", day(4))),
    );
    let sub = ImageSubscription::new(REPO)
        .with_strategy(ImageSelectionStrategy::NewestBuild)
        .with_discovery_limit(3);

    let images = select(backend, ImageCache::default(), &sub).await;
    let tags: Vec<_> = images.iter().map(|i| i.tag.as_str()).collect();
    assert_eq!(tags, vec!["build-c", "build-b", "build-d"]);
}
