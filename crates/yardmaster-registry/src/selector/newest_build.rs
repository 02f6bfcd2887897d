//! `NewestBuild` strategy: most recently built images first.
//!
//! Every surviving tag must be resolved to learn its creation time, so lookups
//! fan out concurrently. Each lookup holds a [`DiscoveryPool`] permit while it
//! talks to the registry. The first failure is recorded and cancels the
//! remaining lookups; results are read only after every lookup has finished.

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{DiscoveryPool, Selector, SelectorOptions};
use crate::client::RepositoryClient;
use crate::error::{RegistryError, Result};
use crate::image::Image;

/// Ranks images by creation time.
#[derive(Debug, Clone)]
pub struct NewestBuildSelector {
    client: RepositoryClient,
    pool: DiscoveryPool,
    options: SelectorOptions,
}

impl NewestBuildSelector {
    /// Creates a selector.
    #[must_use]
    pub const fn new(
        client: RepositoryClient,
        pool: DiscoveryPool,
        options: SelectorOptions,
    ) -> Self {
        Self {
            client,
            pool,
            options,
        }
    }

    /// Sorts images newest first; equal creation times rank the lexically
    /// greater tag first. Images without a creation time sort last.
    pub fn sort(images: &mut [Image]) {
        images.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.tag.cmp(&a.tag))
        });
    }

    async fn lookup(&self, tag: &str, cancel: &CancellationToken) -> Result<Option<Image>> {
        let _permit = self.pool.acquire(cancel).await?;
        self.client
            .get_image_by_tag(tag, self.options.platform.as_ref(), cancel)
            .await
    }
}

#[async_trait]
impl Selector for NewestBuildSelector {
    async fn select(&self, cancel: &CancellationToken) -> Result<Vec<Image>> {
        let tags = self.options.filter.apply(self.client.tags(cancel).await?);
        tracing::debug!(
            repository = %self.client.repo_url(),
            candidates = tags.len(),
            "Resolving all tags to rank by build time"
        );

        let operation = cancel.child_token();
        let failure: Mutex<Option<RegistryError>> = Mutex::new(None);
        let lookups = tags.iter().map(|tag| {
            let operation = &operation;
            let failure = &failure;
            async move {
                match self.lookup(tag, operation).await {
                    Ok(image) => image,
                    Err(err) => {
                        let mut slot = failure.lock();
                        if slot.is_none() {
                            tracing::debug!(tag = %tag, error = %err, "Tag lookup failed, cancelling");
                            *slot = Some(err);
                            operation.cancel();
                        }
                        None
                    }
                }
            }
        });
        let resolved = join_all(lookups).await;

        if let Some(err) = failure.into_inner() {
            return Err(err);
        }
        let mut images: Vec<Image> = resolved.into_iter().flatten().collect();
        Self::sort(&mut images);
        if self.options.discovery_limit > 0 {
            images.truncate(self.options.discovery_limit);
        }
        Ok(images)
    }
}
