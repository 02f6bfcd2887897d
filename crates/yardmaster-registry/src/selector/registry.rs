//! Predicate-dispatched selector registry.

use yardmaster_core::{ImageSelectionStrategy, ImageSubscription, Registry};

use super::{
    DigestSelector, LexicalSelector, NewestBuildSelector, Selector, SelectorDeps,
    SelectorOptions, SemverSelector,
};
use crate::error::{RegistryError, Result};

/// Builds a selector for a subscription.
pub type SelectorFactory =
    Box<dyn Fn(&ImageSubscription, SelectorDeps) -> Result<Box<dyn Selector>> + Send + Sync>;

/// Maps image subscriptions to selector factories.
///
/// Entries are tried in registration order; the first whose predicate accepts
/// the subscription builds the selector.
#[derive(Debug, Default)]
pub struct SelectorRegistry {
    inner: Registry<ImageSubscription, SelectorFactory>,
}

impl SelectorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Registry::new(),
        }
    }

    /// Creates a registry with the four built-in strategies.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in strategy is registered twice.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        registry.register_strategy(ImageSelectionStrategy::Digest, |sub, deps| {
            let options = SelectorOptions::from_subscription(sub)?;
            Ok(Box::new(DigestSelector::new(deps.client, options)?))
        })?;
        registry.register_strategy(ImageSelectionStrategy::Lexical, |sub, deps| {
            let options = SelectorOptions::from_subscription(sub)?;
            Ok(Box::new(LexicalSelector::new(deps.client, options)))
        })?;
        registry.register_strategy(ImageSelectionStrategy::NewestBuild, |sub, deps| {
            let options = SelectorOptions::from_subscription(sub)?;
            Ok(Box::new(NewestBuildSelector::new(
                deps.client,
                deps.pool,
                options,
            )))
        })?;
        registry.register_strategy(ImageSelectionStrategy::SemVer, |sub, deps| {
            let options = SelectorOptions::from_subscription(sub)?;
            Ok(Box::new(SemverSelector::new(deps.client, options)?))
        })?;
        Ok(registry)
    }

    /// Registers a factory behind an arbitrary predicate.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Registration`] if `key` is already registered.
    pub fn register<P, F>(&mut self, key: impl Into<String>, predicate: P, factory: F) -> Result<()>
    where
        P: Fn(&ImageSubscription) -> bool + Send + Sync + 'static,
        F: Fn(&ImageSubscription, SelectorDeps) -> Result<Box<dyn Selector>>
            + Send
            + Sync
            + 'static,
    {
        self.inner
            .register(key, predicate, Box::new(factory) as SelectorFactory)?;
        Ok(())
    }

    fn register_strategy<F>(&mut self, strategy: ImageSelectionStrategy, factory: F) -> Result<()>
    where
        F: Fn(&ImageSubscription, SelectorDeps) -> Result<Box<dyn Selector>>
            + Send
            + Sync
            + 'static,
    {
        self.register(
            strategy.to_string(),
            move |sub: &ImageSubscription| sub.image_selection_strategy == strategy,
            factory,
        )
    }

    /// Builds the selector for a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NoSelector`] if no predicate matches, or the
    /// factory's error.
    pub fn new_selector(
        &self,
        subscription: &ImageSubscription,
        deps: SelectorDeps,
    ) -> Result<Box<dyn Selector>> {
        let factory = self
            .inner
            .resolve(subscription)
            .ok_or_else(|| RegistryError::NoSelector {
                strategy: subscription.image_selection_strategy.to_string(),
            })?;
        factory(subscription, deps)
    }

    /// Returns the number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::cache::ImageCache;
    use crate::client::RepositoryClient;
    use crate::memory::{MemoryBackend, MemoryImage};
    use crate::rate_limit::{RateLimitConfig, RateLimiter};
    use crate::selector::DiscoveryPool;

    fn deps(backend: MemoryBackend) -> SelectorDeps {
        SelectorDeps {
            client: RepositoryClient::new(
                "ghcr.io/acme/api",
                Arc::new(backend),
                ImageCache::default(),
                Arc::new(RateLimiter::new(&RateLimitConfig::new(1000))),
            ),
            pool: DiscoveryPool::new(4),
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = SelectorRegistry::with_builtins().unwrap();
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_duplicate_strategy_rejected() {
        let mut registry = SelectorRegistry::with_builtins().unwrap();
        let err = registry
            .register("SemVer", |_| true, |_, _| unreachable!())
            .unwrap_err();
        assert!(matches!(err, RegistryError::Registration(_)));
    }

    #[test]
    fn test_empty_registry_has_no_selector() {
        let registry = SelectorRegistry::new();
        let err = registry
            .new_selector(&ImageSubscription::new("nginx"), deps(MemoryBackend::new()))
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::NoSelector { .. }));
    }

    #[tokio::test]
    async fn test_dispatches_on_strategy() {
        let registry = SelectorRegistry::with_builtins().unwrap();
        let backend = MemoryBackend::new()
            .with_image("b", MemoryImage::new("sha256:b", None))
            .with_image("a", MemoryImage::new("sha256:a", None));
        let sub = ImageSubscription::new("ghcr.io/acme/api")
            .with_strategy(ImageSelectionStrategy::Lexical);

        let selector = registry.new_selector(&sub, deps(backend)).unwrap();
        let images = selector.select(&CancellationToken::new()).await.unwrap();
        assert_eq!(images[0].tag, "b");
    }
}
