//! Image repository subscriber.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use yardmaster_core::{ImageDiscoveryResult, ImageSubscription};
use yardmaster_registry::{
    images_to_api_images, tag_caching_enabled, OciBackend, RateLimiter, RegistryAuth,
    RegistryBackend, RegistryConfig, RepositoryClient, RepositoryRef, SelectorDeps,
};

use super::{DiscoveryResult, Subscriber, SubscriberDeps};
use crate::credentials::CredentialType;
use crate::error::Result;

/// Creates registry backends for image repositories.
pub trait ImageBackendFactory: Send + Sync + fmt::Debug {
    /// Returns a backend for `repo`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be constructed.
    fn backend(
        &self,
        repo: &RepositoryRef,
        auth: RegistryAuth,
        insecure_skip_tls_verify: bool,
    ) -> yardmaster_registry::Result<Arc<dyn RegistryBackend>>;
}

/// Creates HTTP backends speaking the OCI distribution API.
#[derive(Debug, Clone, Default)]
pub struct OciBackendFactory {
    base: RegistryConfig,
}

impl OciBackendFactory {
    /// Creates a factory deriving every backend's configuration from `base`.
    #[must_use]
    pub const fn new(base: RegistryConfig) -> Self {
        Self { base }
    }
}

impl ImageBackendFactory for OciBackendFactory {
    fn backend(
        &self,
        repo: &RepositoryRef,
        auth: RegistryAuth,
        insecure_skip_tls_verify: bool,
    ) -> yardmaster_registry::Result<Arc<dyn RegistryBackend>> {
        let config = self
            .base
            .clone()
            .with_auth(auth)
            .with_insecure_skip_tls_verify(insecure_skip_tls_verify);
        Ok(Arc::new(OciBackend::new(repo.clone(), config)?))
    }
}

/// Serves image repositories from in-memory backends.
///
/// Repositories that were never inserted are served as empty.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemoryBackends {
    backends: parking_lot::RwLock<HashMap<String, Arc<yardmaster_registry::MemoryBackend>>>,
}

#[cfg(test)]
impl MemoryBackends {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(
        &self,
        repo_url: &str,
        backend: Arc<yardmaster_registry::MemoryBackend>,
    ) -> Result<()> {
        let repo = RepositoryRef::parse(repo_url)?;
        self.backends.write().insert(repo.to_string(), backend);
        Ok(())
    }
}

#[cfg(test)]
impl ImageBackendFactory for MemoryBackends {
    fn backend(
        &self,
        repo: &RepositoryRef,
        _auth: RegistryAuth,
        _insecure_skip_tls_verify: bool,
    ) -> yardmaster_registry::Result<Arc<dyn RegistryBackend>> {
        let backend = self
            .backends
            .write()
            .entry(repo.to_string())
            .or_default()
            .clone();
        Ok(backend)
    }
}

/// One rate limiter per registry host, shared by every subscription.
///
/// Cloning is cheap and yields a handle to the same limiters.
#[derive(Debug, Clone, Default)]
pub struct RateLimiters {
    by_host: Arc<Mutex<HashMap<String, Arc<RateLimiter>>>>,
}

impl RateLimiters {
    /// Returns the limiter for `host`, creating it on first use.
    #[must_use]
    pub fn for_host(&self, host: &str) -> Arc<RateLimiter> {
        self.by_host
            .lock()
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::for_host(host)))
            .clone()
    }
}

/// Discovers images for an [`ImageSubscription`].
#[derive(Debug)]
pub struct ImageSubscriber {
    subscription: ImageSubscription,
    namespace: String,
    deps: SubscriberDeps,
}

impl ImageSubscriber {
    /// Creates a subscriber.
    #[must_use]
    pub fn new(subscription: ImageSubscription, namespace: impl Into<String>, deps: SubscriberDeps) -> Self {
        Self {
            subscription,
            namespace: namespace.into(),
            deps,
        }
    }

    async fn client(&self) -> Result<RepositoryClient> {
        let sub = &self.subscription;
        let auth = self
            .deps
            .credentials
            .get(&self.namespace, CredentialType::Image, &sub.repo_url)
            .await?
            .map_or(RegistryAuth::None, |c| RegistryAuth::basic(c.username, c.password));

        let repo = RepositoryRef::parse(&sub.repo_url)?;
        let backend = self
            .deps
            .image_backends
            .backend(&repo, auth, sub.insecure_skip_tls_verify)?;
        let limiter = self.deps.limiters.for_host(&repo.host);

        Ok(
            RepositoryClient::new(sub.repo_url.clone(), backend, self.deps.cache.clone(), limiter)
                .with_tag_caching(tag_caching_enabled(sub)),
        )
    }
}

#[async_trait]
impl Subscriber for ImageSubscriber {
    async fn discover(&self, cancel: &CancellationToken) -> Result<DiscoveryResult> {
        let sub = &self.subscription;
        let client = self.client().await?;
        let selector = self.deps.selectors.new_selector(
            sub,
            SelectorDeps {
                client,
                pool: self.deps.pool.clone(),
            },
        )?;

        let images = selector.select(cancel).await?;
        let limit = usize::try_from(sub.discovery_limit).unwrap_or(usize::MAX);
        let references = images_to_api_images(&images, limit);
        tracing::debug!(
            repo_url = %sub.repo_url,
            strategy = %sub.image_selection_strategy,
            discovered = references.len(),
            "Discovered images"
        );

        Ok(DiscoveryResult::Image(ImageDiscoveryResult {
            repo_url: sub.repo_url.clone(),
            platform: sub.platform.clone(),
            references,
        }))
    }
}
