//! # Yardmaster Core
//!
//! API types and shared primitives for the Yardmaster artifact-discovery
//! engine.
//!
//! This crate provides the data structures used throughout the Yardmaster
//! workspace, including:
//!
//! - [`Subscription`] - A Warehouse's interest in one Git, image, chart or
//!   generic artifact source
//! - [`Warehouse`] - The managed resource owning subscriptions and policy
//! - [`DiscoveredArtifacts`] - Ranked discovery results recorded in status
//! - [`Freight`] - An immutable, content-addressed bundle of artifacts
//! - [`Conditions`] - Status conditions read by dashboards and CLIs
//! - [`Registry`] - The ordered predicate table behind the selector and
//!   subscriber registries
//!
//! ## Example
//!
//! ```rust
//! use yardmaster_core::{ImageSubscription, Subscription, Validate, WarehouseSpec};
//!
//! let spec = WarehouseSpec::new(vec![Subscription::Image(
//!     ImageSubscription::new("ghcr.io/acme/api").with_constraint("^1.0.0"),
//! )]);
//! assert!(spec.is_valid());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod artifacts;
pub mod conditions;
pub mod duration;
pub mod error;
pub mod freight;
pub mod registry;
pub mod subscription;
pub mod validation;
pub mod warehouse;

#[cfg(test)]
mod proptest_tests;

// Re-export main types at crate root
pub use artifacts::{
    ArtifactReference, ChartDiscoveryResult, DiscoveredArtifacts, DiscoveredCommit,
    DiscoveredImageReference, GenericDiscoveryResult, GitDiscoveryResult, ImageDiscoveryResult,
};
pub use conditions::{Condition, ConditionStatus, ConditionType, Conditions};
pub use duration::{format_duration, parse_duration};
pub use error::{Error, Result};
pub use freight::{Freight, FreightSpec};
pub use registry::Registry;
pub use subscription::{
    ChartSubscription, CommitSelectionStrategy, GenericSubscription, GitSubscription,
    ImageSelectionStrategy, ImageSubscription, Subscription, SubscriptionKind,
};
pub use validation::{Validate, ValidationError, ValidationErrors};
pub use warehouse::{
    FreightCreationCriteria, FreightCreationPolicy, Warehouse, WarehouseSpec, WarehouseStatus,
};
