//! Repository client: resolves tags and digests to [`Image`]s.
//!
//! This module provides the interface selectors use to read one image
//! repository. It owns a handle to the shared [`ImageCache`] and a rate
//! limiter, and interprets manifests and indexes into image metadata.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::RegistryBackend;
use crate::cache::ImageCache;
use crate::error::{RegistryError, Result};
use crate::image::{Image, PlatformConstraint, PlatformVariant};
use crate::oci::{creation_time, Descriptor, ImageIndex, ImageManifest, ManifestResponse};
use crate::rate_limit::RateLimiter;

/// Client for one image repository.
///
/// Cloning is cheap; clones share the backend, cache and rate limiter.
#[derive(Debug, Clone)]
pub struct RepositoryClient {
    repo_url: String,
    backend: Arc<dyn RegistryBackend>,
    cache: ImageCache,
    limiter: Arc<RateLimiter>,
    cache_by_tag: bool,
}

impl RepositoryClient {
    /// Creates a client. Tag caching is off until enabled.
    #[must_use]
    pub fn new(
        repo_url: impl Into<String>,
        backend: Arc<dyn RegistryBackend>,
        cache: ImageCache,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            repo_url: repo_url.into(),
            backend,
            cache,
            limiter,
            cache_by_tag: false,
        }
    }

    /// Enables or disables caching of tag lookups.
    #[must_use]
    pub const fn with_tag_caching(mut self, enabled: bool) -> Self {
        self.cache_by_tag = enabled;
        self
    }

    /// Returns the repository URL.
    #[must_use]
    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    /// Lists every tag in the repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read or `cancel` fires.
    pub async fn tags(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        self.limited(cancel, self.backend.list_tags()).await
    }

    /// Resolves a tag to an image.
    ///
    /// Returns `Ok(None)` when the tag does not exist, or exists but not for
    /// the requested platform.
    ///
    /// # Errors
    ///
    /// Returns an error on registry failures, empty indexes, or cancellation.
    pub async fn get_image_by_tag(
        &self,
        tag: &str,
        platform: Option<&PlatformConstraint>,
        cancel: &CancellationToken,
    ) -> Result<Option<Image>> {
        let key = format!("{}:{tag}", self.repo_url);
        if self.cache_by_tag {
            if let Some(mut image) = self.cache.get(&key) {
                if platform.is_some_and(|p| !p.matches(&image)) {
                    return Ok(None);
                }
                // Metadata of an index comes from the child chosen for one
                // platform; another platform needs its own child.
                let stale = platform.zip(image.resolved_for.as_ref()).is_some_and(
                    |(constraint, chosen)| !constraint.matches_variant(chosen),
                );
                if !stale {
                    tracing::debug!(repository = %self.repo_url, tag, "Image cache hit");
                    image.tag = tag.to_string();
                    return Ok(Some(image));
                }
            }
        }

        let Some(mut image) = self.resolve(tag, platform, cancel).await? else {
            return Ok(None);
        };
        image.tag = tag.to_string();
        if self.cache_by_tag {
            self.cache.insert(key, image.clone());
        }
        Ok(Some(image))
    }

    /// Resolves a digest to an image. Digests are immutable, so the result is
    /// always cached.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ManifestNotFound`] if the digest does not
    /// exist, or any registry error.
    pub async fn get_image_by_digest(
        &self,
        digest: &str,
        cancel: &CancellationToken,
    ) -> Result<Image> {
        if let Some(image) = self.cache.get(digest) {
            tracing::debug!(repository = %self.repo_url, digest, "Image cache hit");
            return Ok(image);
        }

        let image = self
            .resolve(digest, None, cancel)
            .await?
            .ok_or_else(|| RegistryError::ManifestNotFound {
                reference: digest.to_string(),
            })?;
        self.cache.insert(digest, image.clone());
        Ok(image)
    }

    /// Fetches and interprets the manifest behind a tag or digest.
    async fn resolve(
        &self,
        reference: &str,
        platform: Option<&PlatformConstraint>,
        cancel: &CancellationToken,
    ) -> Result<Option<Image>> {
        let response = self
            .limited(cancel, self.backend.fetch_manifest(reference))
            .await?;
        match response {
            None => Ok(None),
            // A single-platform manifest is accepted whatever its platform.
            Some(ManifestResponse::Manifest { digest, manifest }) => self
                .image_from_manifest(digest, &manifest, &BTreeMap::new(), cancel)
                .await
                .map(Some),
            Some(ManifestResponse::Index { digest, index }) => {
                self.image_from_index(reference, digest, &index, platform, cancel)
                    .await
            }
        }
    }

    async fn image_from_index(
        &self,
        reference: &str,
        digest: String,
        index: &ImageIndex,
        platform: Option<&PlatformConstraint>,
        cancel: &CancellationToken,
    ) -> Result<Option<Image>> {
        if index.manifests.is_empty() {
            return Err(RegistryError::EmptyIndex {
                reference: reference.to_string(),
            });
        }

        let variants: Vec<PlatformVariant> = index
            .manifests
            .iter()
            .filter_map(|d| {
                let p = d.platform.as_ref().filter(|p| !p.is_unknown())?;
                let mut variant = PlatformVariant::from_platform(p, d.digest.clone());
                variant.annotations = to_btree(d.annotations.as_ref());
                Some(variant)
            })
            .collect();

        let chosen: Option<&Descriptor> = match platform {
            Some(constraint) => index.manifests.iter().find(|d| {
                d.platform
                    .as_ref()
                    .is_some_and(|p| constraint.matches_platform(p))
            }),
            None => index
                .manifests
                .iter()
                .find(|d| d.platform.as_ref().is_none_or(|p| !p.is_unknown()))
                .or_else(|| index.manifests.first()),
        };
        let Some(chosen) = chosen else {
            tracing::debug!(
                repository = %self.repo_url,
                reference,
                platform = ?platform.map(ToString::to_string),
                "No manifest matches platform"
            );
            return Ok(None);
        };

        let child = self
            .limited(cancel, self.backend.fetch_manifest(&chosen.digest))
            .await?;
        let manifest = match child {
            Some(ManifestResponse::Manifest { manifest, .. }) => manifest,
            Some(ManifestResponse::Index { .. }) => {
                return Err(RegistryError::UnsupportedMediaType {
                    media_type: "nested image index".to_string(),
                    reference: chosen.digest.clone(),
                })
            }
            None => {
                return Err(RegistryError::ManifestNotFound {
                    reference: chosen.digest.clone(),
                })
            }
        };

        let mut inherited = to_btree(index.annotations.as_ref());
        inherited.extend(to_btree(chosen.annotations.as_ref()));
        let mut image = self
            .image_from_manifest(digest, &manifest, &inherited, cancel)
            .await?;
        image.platforms = variants;
        image.resolved_for = chosen
            .platform
            .as_ref()
            .map(|p| PlatformVariant::from_platform(p, chosen.digest.clone()));
        Ok(Some(image))
    }

    /// Builds an image from a manifest and its config blob.
    ///
    /// `inherited` holds index-level annotations; the manifest's own
    /// annotations take precedence over them.
    async fn image_from_manifest(
        &self,
        digest: String,
        manifest: &ImageManifest,
        inherited: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Image> {
        let config = self
            .limited(cancel, self.backend.fetch_config(&manifest.config.digest))
            .await?;

        let mut annotations = inherited.clone();
        annotations.extend(to_btree(manifest.annotations.as_ref()));
        let created_at = creation_time(&annotations, config.labels(), config.created);
        let platforms = config
            .platform()
            .map(|p| vec![PlatformVariant::from_platform(&p, digest.clone())])
            .unwrap_or_default();

        Ok(Image {
            tag: String::new(),
            digest,
            created_at,
            annotations,
            platforms,
            resolved_for: None,
            semver: None,
        })
    }

    /// Runs a registry call after taking a rate-limit token, aborting if
    /// `cancel` fires.
    async fn limited<T>(
        &self,
        cancel: &CancellationToken,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        self.limiter.acquire(cancel).await?;
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RegistryError::Cancelled),
            result = call => result,
        }
    }
}

fn to_btree(
    map: Option<&std::collections::HashMap<String, String>>,
) -> BTreeMap<String, String> {
    map.map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}
