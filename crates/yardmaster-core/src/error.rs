//! Error types for Yardmaster core operations.
//!
//! This module defines the error types used throughout the `yardmaster-core` crate.

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Yardmaster core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A duration string could not be parsed.
    #[error("invalid duration '{input}': {reason}")]
    InvalidDuration {
        /// The offending input.
        input: String,
        /// Reason the input was rejected.
        reason: String,
    },

    /// A registry entry with the same discriminant already exists.
    #[error("'{key}' is already registered")]
    DuplicateRegistration {
        /// Discriminant that was registered twice.
        key: String,
    },

    /// A Freight could not be assembled from discovered artifacts.
    #[error("cannot assemble freight: {reason}")]
    IncompleteFreight {
        /// Reason the Freight is incomplete.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
