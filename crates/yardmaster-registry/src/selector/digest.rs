//! `Digest` strategy: follow one exact, possibly mutable tag.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Selector, SelectorOptions};
use crate::client::RepositoryClient;
use crate::error::{RegistryError, Result};
use crate::image::Image;

/// Resolves the tag named by the subscription constraint.
#[derive(Debug, Clone)]
pub struct DigestSelector {
    client: RepositoryClient,
    tag: String,
    options: SelectorOptions,
}

impl DigestSelector {
    /// Creates a selector.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MissingConstraint`] if no tag is configured.
    pub fn new(client: RepositoryClient, options: SelectorOptions) -> Result<Self> {
        let tag = options
            .constraint
            .clone()
            .ok_or(RegistryError::MissingConstraint {
                strategy: "Digest".to_string(),
            })?;
        Ok(Self {
            client,
            tag,
            options,
        })
    }
}

#[async_trait]
impl Selector for DigestSelector {
    async fn select(&self, cancel: &CancellationToken) -> Result<Vec<Image>> {
        let image = self
            .client
            .get_image_by_tag(&self.tag, self.options.platform.as_ref(), cancel)
            .await?;
        match image {
            Some(image) => Ok(vec![image]),
            None => {
                tracing::debug!(
                    repository = %self.client.repo_url(),
                    tag = %self.tag,
                    "Tag not found for platform"
                );
                Ok(Vec::new())
            }
        }
    }
}
