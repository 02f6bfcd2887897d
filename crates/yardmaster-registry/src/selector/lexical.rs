//! `Lexical` strategy: tags in descending lexical order.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Selector, SelectorOptions};
use crate::client::RepositoryClient;
use crate::error::Result;
use crate::image::Image;

/// Ranks tags by descending string order.
#[derive(Debug, Clone)]
pub struct LexicalSelector {
    client: RepositoryClient,
    options: SelectorOptions,
}

impl LexicalSelector {
    /// Creates a selector.
    #[must_use]
    pub const fn new(client: RepositoryClient, options: SelectorOptions) -> Self {
        Self { client, options }
    }

    /// Sorts tags in descending lexical order.
    pub fn sort(tags: &mut [String]) {
        tags.sort_unstable_by(|a, b| b.cmp(a));
    }
}

#[async_trait]
impl Selector for LexicalSelector {
    async fn select(&self, cancel: &CancellationToken) -> Result<Vec<Image>> {
        let mut tags = self.options.filter.apply(self.client.tags(cancel).await?);
        Self::sort(&mut tags);
        tracing::debug!(
            repository = %self.client.repo_url(),
            candidates = tags.len(),
            "Resolving tags in lexical order"
        );

        let mut images = Vec::new();
        for tag in &tags {
            if self.options.limit_reached(images.len()) {
                break;
            }
            if let Some(image) = self
                .client
                .get_image_by_tag(tag, self.options.platform.as_ref(), cancel)
                .await?
            {
                images.push(image);
            }
        }
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use yardmaster_core::{ImageSelectionStrategy, ImageSubscription};

    use super::*;
    use crate::cache::ImageCache;
    use crate::memory::{MemoryBackend, MemoryImage};
    use crate::oci::Platform;
    use crate::rate_limit::{RateLimitConfig, RateLimiter};

    fn selector(backend: Arc<MemoryBackend>, sub: &ImageSubscription) -> LexicalSelector {
        let client = RepositoryClient::new(
            sub.repo_url.clone(),
            backend,
            ImageCache::default(),
            Arc::new(RateLimiter::new(&RateLimitConfig::new(1000))),
        );
        LexicalSelector::new(client, SelectorOptions::from_subscription(sub).unwrap())
    }

    #[test]
    fn test_sort_descending() {
        let mut tags = vec![
            "nightly-20240101".to_string(),
            "nightly-20240315".to_string(),
            "nightly-20231231".to_string(),
        ];
        LexicalSelector::sort(&mut tags);
        assert_eq!(
            tags,
            vec!["nightly-20240315", "nightly-20240101", "nightly-20231231"]
        );
    }

    #[tokio::test]
    async fn test_select_filters_and_limits() {
        let backend = Arc::new(
            MemoryBackend::new()
                .with_image("b", MemoryImage::new("sha256:b", None))
                .with_image("a", MemoryImage::new("sha256:a", None))
                .with_image("c", MemoryImage::new("sha256:c", None))
                .with_image("c-debug", MemoryImage::new("sha256:cd", None)),
        );
        let mut sub = ImageSubscription::new("ghcr.io/acme/api")
            .with_strategy(ImageSelectionStrategy::Lexical)
            .with_discovery_limit(2);
        sub.ignore_tags = vec!["-debug$".to_string()];

        let images = selector(Arc::clone(&backend), &sub)
            .select(&CancellationToken::new())
            .await
            .unwrap();
        let tags: Vec<_> = images.iter().map(|i| i.tag.as_str()).collect();
        assert_eq!(tags, vec!["c", "b"]);
        // Resolution stops once the limit is reached.
        assert_eq!(backend.manifest_fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_skips_tags_missing_platform() {
        let amd = Platform::new("linux", "amd64");
        let arm = Platform::new("linux", "arm64");
        let backend = Arc::new(
            MemoryBackend::new()
                .with_index(
                    "b",
                    "sha256:ib",
                    vec![MemoryImage::new("sha256:b-arm", None).with_platform(arm)],
                )
                .with_index(
                    "a",
                    "sha256:ia",
                    vec![MemoryImage::new("sha256:a-amd", None).with_platform(amd)],
                ),
        );
        let sub = ImageSubscription::new("ghcr.io/acme/api")
            .with_strategy(ImageSelectionStrategy::Lexical)
            .with_platform("linux/amd64");

        let images = selector(backend, &sub)
            .select(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].digest, "sha256:ia");
    }
}
