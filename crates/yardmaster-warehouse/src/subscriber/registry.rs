//! Predicate-dispatched subscriber registry.

use std::sync::Arc;

use yardmaster_core::{Registry, Subscription};

use super::{
    ChartSubscriber, GenericSource, GenericSubscriber, GitSubscriber, ImageSubscriber,
    Subscriber, SubscriberDeps,
};
use crate::error::{Result, WarehouseError};

/// Builds a subscriber for a subscription within a namespace.
pub type SubscriberFactory =
    Box<dyn Fn(&Subscription, &SubscriberDeps, &str) -> Result<Box<dyn Subscriber>> + Send + Sync>;

/// Maps subscriptions to subscriber factories.
///
/// Git, image and chart subscriptions are served by built-in factories;
/// generic subscriptions by sources registered per kind.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    inner: Registry<Subscription, SubscriberFactory>,
}

impl SubscriberRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Registry::new(),
        }
    }

    /// Creates a registry serving Git, image and chart subscriptions.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in factory is registered twice.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(
            "git",
            |sub| matches!(sub, Subscription::Git(_)),
            |sub, deps, namespace| match sub {
                Subscription::Git(git) => Ok(Box::new(GitSubscriber::new(
                    git.clone(),
                    namespace,
                    deps.clone(),
                ))),
                other => Err(mismatch(other)),
            },
        )?;
        registry.register(
            "image",
            |sub| matches!(sub, Subscription::Image(_)),
            |sub, deps, namespace| match sub {
                Subscription::Image(image) => Ok(Box::new(ImageSubscriber::new(
                    image.clone(),
                    namespace,
                    deps.clone(),
                ))),
                other => Err(mismatch(other)),
            },
        )?;
        registry.register(
            "chart",
            |sub| matches!(sub, Subscription::Chart(_)),
            |sub, deps, namespace| match sub {
                Subscription::Chart(chart) => Ok(Box::new(ChartSubscriber::new(
                    chart.clone(),
                    namespace,
                    deps.clone(),
                ))),
                other => Err(mismatch(other)),
            },
        )?;
        Ok(registry)
    }

    /// Registers a factory behind an arbitrary predicate.
    ///
    /// # Errors
    ///
    /// Returns an error if `key` is already registered.
    pub fn register<P, F>(&mut self, key: impl Into<String>, predicate: P, factory: F) -> Result<()>
    where
        P: Fn(&Subscription) -> bool + Send + Sync + 'static,
        F: Fn(&Subscription, &SubscriberDeps, &str) -> Result<Box<dyn Subscriber>>
            + Send
            + Sync
            + 'static,
    {
        self.inner
            .register(key, predicate, Box::new(factory) as SubscriberFactory)?;
        Ok(())
    }

    /// Serves generic subscriptions of `kind` from `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is already registered for `kind`.
    pub fn register_generic(
        &mut self,
        kind: impl Into<String>,
        source: Arc<dyn GenericSource>,
    ) -> Result<()> {
        let kind = kind.into();
        let matched = kind.clone();
        self.register(
            format!("generic:{kind}"),
            move |sub| matches!(sub, Subscription::Generic(g) if g.kind == matched),
            move |sub, _deps, _namespace| match sub {
                Subscription::Generic(generic) => Ok(Box::new(GenericSubscriber::new(
                    generic.clone(),
                    Arc::clone(&source),
                ))),
                other => Err(mismatch(other)),
            },
        )
    }

    /// Builds the subscriber for a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::NoSubscriber`] if no predicate matches.
    pub fn new_subscriber(
        &self,
        subscription: &Subscription,
        deps: &SubscriberDeps,
        namespace: &str,
    ) -> Result<Box<dyn Subscriber>> {
        let factory = self
            .inner
            .resolve(subscription)
            .ok_or_else(|| WarehouseError::NoSubscriber {
                description: subscription.describe(),
            })?;
        factory(subscription, deps, namespace)
    }

    /// Returns true if some factory accepts the subscription.
    #[must_use]
    pub fn supports(&self, subscription: &Subscription) -> bool {
        self.inner.resolve(subscription).is_some()
    }

    /// Returns the registered keys in order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.inner.keys().collect()
    }
}

fn mismatch(subscription: &Subscription) -> WarehouseError {
    WarehouseError::InvalidSubscription {
        reason: format!("factory cannot serve {}", subscription.describe()),
    }
}
