//! In-memory registry backend.
//!
//! Serves a fixed set of images without network access and counts every
//! fetch, which is what tests assert caching and platform behavior against.
//! Only built for tests and with the `testing` feature.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::backend::RegistryBackend;
use crate::error::{RegistryError, Result};
use crate::oci::{
    ContainerConfig, Descriptor, ImageConfig, ImageIndex, ImageManifest, ManifestResponse,
    MediaType, Platform,
};

/// Description of one single-platform image served by a [`MemoryBackend`].
#[derive(Debug, Clone, Default)]
pub struct MemoryImage {
    /// Manifest digest.
    pub digest: String,
    /// Config `created` field.
    pub created: Option<DateTime<Utc>>,
    /// Platform recorded in the config.
    pub platform: Option<Platform>,
    /// Manifest annotations.
    pub annotations: HashMap<String, String>,
    /// Config labels.
    pub labels: HashMap<String, String>,
}

impl MemoryImage {
    /// Creates an image with the given digest and creation time.
    #[must_use]
    pub fn new(digest: impl Into<String>, created: Option<DateTime<Utc>>) -> Self {
        Self {
            digest: digest.into(),
            created,
            ..Self::default()
        }
    }

    /// Sets the platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Adds a manifest annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Adds a config label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    fn config_digest(&self) -> String {
        format!("{}-config", self.digest)
    }
}

#[derive(Debug, Default)]
struct State {
    tags: Vec<String>,
    manifests: HashMap<String, ManifestResponse>,
    configs: HashMap<String, ImageConfig>,
    failing: HashSet<String>,
}

/// Registry backend serving images from memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
    tag_lists: AtomicUsize,
    manifest_fetches: AtomicUsize,
    config_fetches: AtomicUsize,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a single-platform image under `tag`.
    #[must_use]
    pub fn with_image(self, tag: impl Into<String>, image: MemoryImage) -> Self {
        self.push_image(tag, image);
        self
    }

    /// Publishes a multi-platform index under `tag`.
    #[must_use]
    pub fn with_index(
        self,
        tag: impl Into<String>,
        index_digest: impl Into<String>,
        images: Vec<MemoryImage>,
    ) -> Self {
        self.push_index(tag, index_digest, images, HashMap::new());
        self
    }

    /// Makes every fetch of `reference` fail with a server error.
    #[must_use]
    pub fn with_failure(self, reference: impl Into<String>) -> Self {
        self.state.write().failing.insert(reference.into());
        self
    }

    /// Publishes a single-platform image under `tag`.
    pub fn push_image(&self, tag: impl Into<String>, image: MemoryImage) {
        let tag = tag.into();
        let manifest = self.store_manifest(&image);
        let mut state = self.state.write();
        state.manifests.insert(tag.clone(), manifest);
        if !state.tags.contains(&tag) {
            state.tags.push(tag);
        }
    }

    /// Publishes a multi-platform index under `tag`, with index-level
    /// descriptor annotations applied to every entry.
    pub fn push_index(
        &self,
        tag: impl Into<String>,
        index_digest: impl Into<String>,
        images: Vec<MemoryImage>,
        descriptor_annotations: HashMap<String, String>,
    ) {
        let tag = tag.into();
        let manifests = images
            .iter()
            .map(|image| {
                self.store_manifest(image);
                Descriptor {
                    media_type: MediaType::OCI_MANIFEST.to_string(),
                    digest: image.digest.clone(),
                    size: 0,
                    platform: image.platform.clone(),
                    annotations: (!descriptor_annotations.is_empty())
                        .then(|| descriptor_annotations.clone()),
                }
            })
            .collect();
        let digest = index_digest.into();
        let index = ManifestResponse::Index {
            digest: digest.clone(),
            index: ImageIndex {
                schema_version: 2,
                media_type: Some(MediaType::OCI_INDEX.to_string()),
                manifests,
                annotations: None,
            },
        };

        let mut state = self.state.write();
        state.manifests.insert(digest, index.clone());
        state.manifests.insert(tag.clone(), index);
        if !state.tags.contains(&tag) {
            state.tags.push(tag);
        }
    }

    /// Stores a manifest and its config under the image digest.
    fn store_manifest(&self, image: &MemoryImage) -> ManifestResponse {
        let manifest = ManifestResponse::Manifest {
            digest: image.digest.clone(),
            manifest: ImageManifest {
                schema_version: 2,
                media_type: Some(MediaType::OCI_MANIFEST.to_string()),
                config: Descriptor {
                    media_type: "application/vnd.oci.image.config.v1+json".to_string(),
                    digest: image.config_digest(),
                    ..Descriptor::default()
                },
                layers: Vec::new(),
                annotations: (!image.annotations.is_empty()).then(|| image.annotations.clone()),
            },
        };
        let platform = image.platform.clone().unwrap_or_default();
        let config = ImageConfig {
            created: image.created,
            os: platform.os,
            architecture: platform.architecture,
            variant: platform.variant,
            config: (!image.labels.is_empty()).then(|| ContainerConfig {
                labels: Some(image.labels.clone()),
            }),
        };

        let mut state = self.state.write();
        state.manifests.insert(image.digest.clone(), manifest.clone());
        state.configs.insert(image.config_digest(), config);
        manifest
    }

    /// Removes a tag, as if it had been deleted upstream.
    pub fn remove_tag(&self, tag: &str) {
        let mut state = self.state.write();
        state.tags.retain(|t| t != tag);
        state.manifests.remove(tag);
    }

    /// Number of tag listings served.
    #[must_use]
    pub fn tag_list_count(&self) -> usize {
        self.tag_lists.load(Ordering::SeqCst)
    }

    /// Number of manifest fetches served, including misses.
    #[must_use]
    pub fn manifest_fetch_count(&self) -> usize {
        self.manifest_fetches.load(Ordering::SeqCst)
    }

    /// Number of config fetches served.
    #[must_use]
    pub fn config_fetch_count(&self) -> usize {
        self.config_fetches.load(Ordering::SeqCst)
    }

    fn check_failure(&self, reference: &str) -> Result<()> {
        if self.state.read().failing.contains(reference) {
            return Err(RegistryError::HttpError {
                status: 500,
                message: format!("injected failure for {reference}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryBackend for MemoryBackend {
    async fn list_tags(&self) -> Result<Vec<String>> {
        self.tag_lists.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.read().tags.clone())
    }

    async fn fetch_manifest(&self, reference: &str) -> Result<Option<ManifestResponse>> {
        self.manifest_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_failure(reference)?;
        Ok(self.state.read().manifests.get(reference).cloned())
    }

    async fn fetch_config(&self, digest: &str) -> Result<ImageConfig> {
        self.config_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_failure(digest)?;
        self.state
            .read()
            .configs
            .get(digest)
            .cloned()
            .ok_or_else(|| RegistryError::HttpError {
                status: 404,
                message: format!("blob {digest} not found"),
            })
    }
}
