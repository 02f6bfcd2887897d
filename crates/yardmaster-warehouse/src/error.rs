//! Error types for the warehouse crate.
//!
//! This module defines all errors that can occur while discovering artifacts
//! and reconciling Warehouses.

use thiserror::Error;
use yardmaster_registry::RegistryError;

use crate::criteria::CriteriaError;

/// Result type alias for warehouse operations.
pub type Result<T> = std::result::Result<T, WarehouseError>;

/// Errors that can occur during Warehouse reconciliation.
#[derive(Error, Debug)]
pub enum WarehouseError {
    /// Image registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Credentials could not be looked up.
    #[error("failed to obtain credentials for '{repo_url}': {reason}")]
    Credentials {
        /// Repository the credentials were requested for.
        repo_url: String,
        /// Failure reason.
        reason: String,
    },

    /// Git repository could not be read.
    #[error("git discovery failed for '{repo_url}': {reason}")]
    Git {
        /// Repository URL.
        repo_url: String,
        /// Failure reason.
        reason: String,
    },

    /// Chart repository could not be read.
    #[error("chart discovery failed for '{repo_url}': {reason}")]
    Chart {
        /// Repository URL.
        repo_url: String,
        /// Failure reason.
        reason: String,
    },

    /// A generic source failed.
    #[error("{kind} source '{name}' failed: {reason}")]
    Generic {
        /// Source kind.
        kind: String,
        /// Subscription name.
        name: String,
        /// Failure reason.
        reason: String,
    },

    /// No subscriber is registered for a subscription.
    #[error("no subscriber registered for {description}")]
    NoSubscriber {
        /// Description of the subscription.
        description: String,
    },

    /// Invalid subscription configuration.
    #[error("invalid subscription: {reason}")]
    InvalidSubscription {
        /// Reason for invalidity.
        reason: String,
    },

    /// Persistence error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Criteria could not be compiled or evaluated.
    #[error(transparent)]
    Criteria(#[from] CriteriaError),

    /// Core error (registration, freight assembly, durations).
    #[error(transparent)]
    Core(#[from] yardmaster_core::Error),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WarehouseError {
    /// Returns true if retrying with backoff may succeed.
    ///
    /// Configuration problems only go away when the Warehouse spec changes,
    /// so they are not retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::NoSubscriber { .. }
                | Self::InvalidSubscription { .. }
                | Self::Criteria(_)
                | Self::Registry(
                    RegistryError::InvalidReference { .. }
                        | RegistryError::InvalidPlatform { .. }
                        | RegistryError::InvalidTagPattern { .. }
                        | RegistryError::InvalidConstraint { .. }
                        | RegistryError::MissingConstraint { .. }
                        | RegistryError::NoSelector { .. }
                )
        )
    }
}

/// Persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The object does not exist.
    #[error("{kind} '{namespace}/{name}' not found")]
    NotFound {
        /// Object kind.
        kind: &'static str,
        /// Namespace.
        namespace: String,
        /// Name.
        name: String,
    },

    /// An object with the same name already exists.
    #[error("{kind} '{namespace}/{name}' already exists")]
    AlreadyExists {
        /// Object kind.
        kind: &'static str,
        /// Namespace.
        namespace: String,
        /// Name.
        name: String,
    },

    /// The object has no name.
    #[error("{kind} has no name")]
    MissingName {
        /// Object kind.
        kind: &'static str,
    },

    /// The store could not be reached.
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Failure reason.
        reason: String,
    },

    /// Kubernetes API error.
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if the error reports an existing object.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WarehouseError::Git {
            repo_url: "https://github.com/acme/app".to_string(),
            reason: "repository not found".to_string(),
        };
        assert!(err.to_string().contains("github.com/acme/app"));
        assert!(err.to_string().contains("repository not found"));
    }

    #[test]
    fn test_network_errors_are_retryable() {
        let err = WarehouseError::Registry(RegistryError::HttpError {
            status: 502,
            message: "bad gateway".to_string(),
        });
        assert!(err.is_retryable());
        assert!(WarehouseError::Cancelled.is_retryable());
    }

    #[test]
    fn test_configuration_errors_not_retryable() {
        let err = WarehouseError::Registry(RegistryError::InvalidPlatform {
            platform: "linux".to_string(),
        });
        assert!(!err.is_retryable());

        let err = WarehouseError::NoSubscriber {
            description: "generic subscription 'x'".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_already_exists() {
        let err = StoreError::AlreadyExists {
            kind: "Freight",
            namespace: "default".to_string(),
            name: "abc".to_string(),
        };
        assert!(err.is_already_exists());
        assert!(err.to_string().contains("default/abc"));
    }
}
