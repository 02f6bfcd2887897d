//! Image selection strategies.
//!
//! A [`Selector`] performs one discovery pass over an image repository and
//! returns images ranked best-first. Selectors are stateless across calls;
//! the only side effect of `select` is cache population.

mod digest;
mod lexical;
mod newest_build;
mod registry;
mod semver;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use yardmaster_core::{DiscoveredImageReference, ImageSelectionStrategy, ImageSubscription};

use crate::client::RepositoryClient;
use crate::error::{RegistryError, Result};
use crate::filter::TagFilter;
use crate::image::{Image, PlatformConstraint};
use crate::version::VersionConstraint;

pub use self::digest::DigestSelector;
pub use self::lexical::LexicalSelector;
pub use self::newest_build::NewestBuildSelector;
pub use self::registry::{SelectorFactory, SelectorRegistry};
pub use self::semver::{SemverSelector, SemverTag};

/// Default number of concurrent image lookups across all discoveries.
pub const DEFAULT_DISCOVERY_POOL_SIZE: usize = 64;

/// Discovers and ranks images for one subscription.
#[async_trait]
pub trait Selector: Send + Sync {
    /// Returns images ranked best-first, truncated to the discovery limit.
    async fn select(&self, cancel: &CancellationToken) -> Result<Vec<Image>>;
}

/// Process-wide ceiling on concurrent registry lookups.
///
/// Constructed once at startup and shared by every selector so that
/// concurrent discoveries together never exceed the ceiling.
#[derive(Debug, Clone)]
pub struct DiscoveryPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl Default for DiscoveryPool {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_POOL_SIZE)
    }
}

impl DiscoveryPool {
    /// Creates a pool with `size` permits (at least one).
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Waits for a permit.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Cancelled`] if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RegistryError::Cancelled),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| RegistryError::Cancelled)
            }
        }
    }

    /// Returns the number of permits.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Returns the number of permits currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Settings shared by every strategy, derived from an image subscription.
#[derive(Debug, Clone)]
pub struct SelectorOptions {
    /// Platform constraint.
    pub platform: Option<PlatformConstraint>,
    /// Tag allow/ignore filter.
    pub filter: TagFilter,
    /// Maximum number of images returned; 0 means unlimited.
    pub discovery_limit: usize,
    /// Raw constraint (semver range or exact tag).
    pub constraint: Option<String>,
    /// Reject partial versions.
    pub strict_semvers: bool,
}

impl SelectorOptions {
    /// Derives options from a subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform or a tag pattern is invalid.
    pub fn from_subscription(subscription: &ImageSubscription) -> Result<Self> {
        let platform = subscription
            .platform
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(str::parse)
            .transpose()?;
        Ok(Self {
            platform,
            filter: TagFilter::new(&subscription.allow_tags, &subscription.ignore_tags)?,
            discovery_limit: subscription.discovery_limit as usize,
            constraint: subscription
                .constraint
                .clone()
                .filter(|c| !c.trim().is_empty()),
            strict_semvers: subscription.strict_semvers,
        })
    }

    /// Parses the constraint as a semver range, if set.
    ///
    /// # Errors
    ///
    /// Returns an error if the constraint is not a valid range.
    pub fn version_constraint(&self) -> Result<Option<VersionConstraint>> {
        self.constraint
            .as_deref()
            .map(VersionConstraint::parse)
            .transpose()
    }

    /// Returns true once `count` images satisfy the discovery limit.
    #[must_use]
    pub const fn limit_reached(&self, count: usize) -> bool {
        self.discovery_limit > 0 && count >= self.discovery_limit
    }
}

/// Everything a selector factory needs besides the subscription.
#[derive(Debug, Clone)]
pub struct SelectorDeps {
    /// Client for the subscribed repository.
    pub client: RepositoryClient,
    /// Shared lookup ceiling.
    pub pool: DiscoveryPool,
}

/// Returns true if the strategy should cache tag lookups for `subscription`.
///
/// The `Digest` strategy follows a mutable tag, so it never trusts a cached
/// tag lookup.
#[must_use]
pub fn tag_caching_enabled(subscription: &ImageSubscription) -> bool {
    subscription.cache_by_tag
        && subscription.image_selection_strategy != ImageSelectionStrategy::Digest
}

/// Converts ranked images to status references, keeping at most `limit`
/// (all when `limit` is 0) and preserving order.
///
/// # Examples
///
/// ```
/// use yardmaster_registry::{images_to_api_images, Image};
///
/// let images = vec![Image::default(), Image::default(), Image::default()];
/// assert_eq!(images_to_api_images(&images, 2).len(), 2);
/// assert_eq!(images_to_api_images(&images, 0).len(), 3);
/// ```
#[must_use]
pub fn images_to_api_images(images: &[Image], limit: usize) -> Vec<DiscoveredImageReference> {
    let take = if limit == 0 { images.len() } else { limit };
    images.iter().take(take).map(Image::to_discovered).collect()
}
