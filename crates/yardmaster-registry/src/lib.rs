//! # Yardmaster Registry
//!
//! Container image discovery against OCI-compatible registries.
//!
//! This crate resolves image tags and digests to metadata and ranks a
//! repository's images according to a subscription's selection strategy.
//!
//! ## Features
//!
//! - **OCI Distribution API**: tag listing, manifests, indexes and config blobs
//! - **Shared caching**: one process-wide LRU cache of resolved images
//! - **Rate limiting**: per-registry token buckets that wait instead of failing
//! - **Selection strategies**: `Digest`, `Lexical`, `NewestBuild` and `SemVer`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tokio_util::sync::CancellationToken;
//! use yardmaster_core::ImageSubscription;
//! use yardmaster_registry::{
//!     DiscoveryPool, ImageCache, OciBackend, RateLimiter, RegistryConfig, RepositoryClient,
//!     RepositoryRef, SelectorDeps, SelectorRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subscription = ImageSubscription::new("ghcr.io/acme/api");
//!     let repo = RepositoryRef::parse(&subscription.repo_url)?;
//!     let client = RepositoryClient::new(
//!         subscription.repo_url.clone(),
//!         Arc::new(OciBackend::new(repo.clone(), RegistryConfig::default())?),
//!         ImageCache::default(),
//!         Arc::new(RateLimiter::for_host(&repo.host)),
//!     );
//!
//!     let selectors = SelectorRegistry::with_builtins()?;
//!     let deps = SelectorDeps { client, pool: DiscoveryPool::default() };
//!     let selector = selectors.new_selector(&subscription, deps)?;
//!     let images = selector.select(&CancellationToken::new()).await?;
//!     println!("newest: {:?}", images.first().map(|i| &i.tag));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SelectorRegistry                       │
//! │   Digest  │  Lexical  │  NewestBuild  │  SemVer             │
//! └─────────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RepositoryClient                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │ ImageCache  │  │ RateLimiter │  │  RegistryBackend    │  │
//! │  │  (shared)   │  │ (per host)  │  │  (OCI HTTP/memory)  │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cache;
mod client;
mod config;
mod error;
mod filter;
mod image;
#[cfg(any(test, feature = "testing"))]
mod memory;
pub mod oci;
mod rate_limit;
mod selector;
mod version;

#[cfg(test)]
mod proptest_tests;

pub use backend::{OciBackend, RegistryBackend};
pub use cache::{CacheConfig, ImageCache, DEFAULT_MAX_ENTRIES, MAX_ENTRIES_LIMIT};
pub use client::RepositoryClient;
pub use config::{RegistryAuth, RegistryConfig, RepositoryRef, DOCKER_HUB_HOST};
pub use error::{RegistryError, Result};
pub use filter::TagFilter;
pub use image::{Image, PlatformConstraint, PlatformVariant};
#[cfg(any(test, feature = "testing"))]
pub use memory::{MemoryBackend, MemoryImage};
pub use rate_limit::{
    RateLimitConfig, RateLimiter, DEFAULT_REQUESTS_PER_SECOND, HIGH_LIMIT_REQUESTS_PER_SECOND,
};
pub use selector::{
    images_to_api_images, tag_caching_enabled, DigestSelector, DiscoveryPool, LexicalSelector,
    NewestBuildSelector, Selector, SelectorDeps, SelectorFactory, SelectorOptions,
    SelectorRegistry, SemverSelector, SemverTag, DEFAULT_DISCOVERY_POOL_SIZE,
};
pub use version::{parse_version, VersionConstraint};
