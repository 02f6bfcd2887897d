//! Subscribers: per-subscription discovery.
//!
//! A [`Subscriber`] is built for one subscription by the
//! [`SubscriberRegistry`] and queries its source for the artifacts currently
//! available, ranked best first. Everything a subscriber needs from the
//! process (credentials, the shared image cache and discovery pool, the
//! selector registry and the source clients) travels in [`SubscriberDeps`].

pub mod chart;
pub mod generic;
pub mod git;
pub mod image;
mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use yardmaster_core::{
    ChartDiscoveryResult, DiscoveredArtifacts, GenericDiscoveryResult, GitDiscoveryResult,
    ImageDiscoveryResult,
};
use yardmaster_registry::{DiscoveryPool, ImageCache, SelectorRegistry};

use crate::credentials::CredentialsDatabase;
use crate::error::Result;

pub use chart::{ChartDiscoverer, ChartSubscriber, HelmRepositories};
pub use generic::{GenericSource, GenericSubscriber};
pub use git::{GitCli, GitDiscoverer, GitSubscriber, RemoteRef};
pub use image::{ImageBackendFactory, ImageSubscriber, OciBackendFactory, RateLimiters};
#[cfg(test)]
pub(crate) use image::MemoryBackends;
pub use registry::{SubscriberFactory, SubscriberRegistry};

/// The result of discovering one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryResult {
    /// Commits from a Git repository.
    Git(GitDiscoveryResult),
    /// Images from an image repository.
    Image(ImageDiscoveryResult),
    /// Versions from a chart repository.
    Chart(ChartDiscoveryResult),
    /// References from a generic source.
    Generic(GenericDiscoveryResult),
}

impl DiscoveryResult {
    /// Returns true if nothing was discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Git(r) => r.commits.is_empty(),
            Self::Image(r) => r.references.is_empty(),
            Self::Chart(r) => r.versions.is_empty(),
            Self::Generic(r) => r.references.is_empty(),
        }
    }

    /// Appends this result to the matching list of `artifacts`.
    pub fn append_to(self, artifacts: &mut DiscoveredArtifacts) {
        match self {
            Self::Git(r) => artifacts.git.push(r),
            Self::Image(r) => artifacts.images.push(r),
            Self::Chart(r) => artifacts.charts.push(r),
            Self::Generic(r) => artifacts.results.push(r),
        }
    }
}

/// Discovers the artifacts of one subscription.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Queries the source and returns the ranked, limited results.
    ///
    /// An empty result is not an error.
    async fn discover(&self, cancel: &CancellationToken) -> Result<DiscoveryResult>;
}

/// Process-wide collaborators handed to every subscriber.
///
/// Cloning is cheap; clones share every collaborator.
#[derive(Clone)]
pub struct SubscriberDeps {
    /// Credentials lookup.
    pub credentials: Arc<dyn CredentialsDatabase>,
    /// Shared image metadata cache.
    pub cache: ImageCache,
    /// Shared bound on concurrent image lookups.
    pub pool: DiscoveryPool,
    /// Per-host registry rate limiters.
    pub limiters: RateLimiters,
    /// Image selection strategies.
    pub selectors: Arc<SelectorRegistry>,
    /// Source of image registry backends.
    pub image_backends: Arc<dyn ImageBackendFactory>,
    /// Git remote access.
    pub git: Arc<dyn GitDiscoverer>,
    /// Chart repository access.
    pub charts: Arc<dyn ChartDiscoverer>,
}

impl std::fmt::Debug for SubscriberDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberDeps")
            .field("cache_capacity", &self.cache.capacity())
            .field("pool_size", &self.pool.size())
            .field("selectors", &self.selectors.len())
            .field("image_backends", &self.image_backends)
            .field("git", &self.git)
            .field("charts", &self.charts)
            .finish_non_exhaustive()
    }
}

impl SubscriberDeps {
    /// Creates dependencies with a default cache, pool and the built-in
    /// selection strategies.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in strategies fail to register.
    pub fn new(
        credentials: Arc<dyn CredentialsDatabase>,
        image_backends: Arc<dyn ImageBackendFactory>,
        git: Arc<dyn GitDiscoverer>,
        charts: Arc<dyn ChartDiscoverer>,
    ) -> Result<Self> {
        Ok(Self {
            credentials,
            cache: ImageCache::default(),
            pool: DiscoveryPool::default(),
            limiters: RateLimiters::default(),
            selectors: Arc::new(SelectorRegistry::with_builtins()?),
            image_backends,
            git,
            charts,
        })
    }

    /// Replaces the image cache.
    #[must_use]
    pub fn with_cache(mut self, cache: ImageCache) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the discovery pool.
    #[must_use]
    pub fn with_pool(mut self, pool: DiscoveryPool) -> Self {
        self.pool = pool;
        self
    }
}
