//! Subscribers backed by pluggable sources.
//!
//! A [`GenericSource`] is registered under a kind in the
//! [`SubscriberRegistry`](super::SubscriberRegistry); generic subscriptions of
//! that kind are discovered through it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use yardmaster_core::{ArtifactReference, GenericDiscoveryResult, GenericSubscription};

use super::{DiscoveryResult, Subscriber};
use crate::error::Result;

/// A source of artifact references for one generic subscription kind.
#[async_trait]
pub trait GenericSource: Send + Sync {
    /// Returns the artifact references currently available, best first.
    async fn discover(
        &self,
        subscription: &GenericSubscription,
        cancel: &CancellationToken,
    ) -> Result<Vec<ArtifactReference>>;
}

/// Discovers artifact references for a [`GenericSubscription`].
pub struct GenericSubscriber {
    subscription: GenericSubscription,
    source: Arc<dyn GenericSource>,
}

impl std::fmt::Debug for GenericSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericSubscriber")
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

impl GenericSubscriber {
    /// Creates a subscriber reading from `source`.
    #[must_use]
    pub fn new(subscription: GenericSubscription, source: Arc<dyn GenericSource>) -> Self {
        Self {
            subscription,
            source,
        }
    }
}

#[async_trait]
impl Subscriber for GenericSubscriber {
    async fn discover(&self, cancel: &CancellationToken) -> Result<DiscoveryResult> {
        let sub = &self.subscription;
        let mut references = self.source.discover(sub, cancel).await?;
        references.truncate(usize::try_from(sub.discovery_limit).unwrap_or(usize::MAX));
        tracing::debug!(
            kind = %sub.kind,
            name = %sub.name,
            discovered = references.len(),
            "Discovered artifact references"
        );

        Ok(DiscoveryResult::Generic(GenericDiscoveryResult {
            name: sub.name.clone(),
            kind: sub.kind.clone(),
            references,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    struct Counting;

    #[async_trait]
    impl GenericSource for Counting {
        async fn discover(
            &self,
            subscription: &GenericSubscription,
            _cancel: &CancellationToken,
        ) -> Result<Vec<ArtifactReference>> {
            Ok((0..5)
                .rev()
                .map(|i| ArtifactReference {
                    subscription_name: subscription.name.clone(),
                    version: format!("v{i}"),
                    metadata: BTreeMap::new(),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_truncates_to_limit() {
        let subscription = GenericSubscription {
            kind: "counter".to_string(),
            name: "bundle".to_string(),
            parameters: BTreeMap::new(),
            discovery_limit: 2,
        };
        let subscriber = GenericSubscriber::new(subscription, Arc::new(Counting));
        let DiscoveryResult::Generic(result) =
            subscriber.discover(&CancellationToken::new()).await.unwrap()
        else {
            panic!("expected generic result");
        };
        assert_eq!(result.name, "bundle");
        assert_eq!(result.kind, "counter");
        let versions: Vec<_> = result.references.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, vec!["v4", "v3"]);
    }
}
