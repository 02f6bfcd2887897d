//! Error types for registry operations.

use thiserror::Error;

/// Result type alias using [`RegistryError`].
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to connect to registry.
    #[error("Failed to connect to registry at {url}: {source}")]
    ConnectionFailed {
        /// Registry URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Authentication failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Error message.
        message: String,
    },

    /// HTTP error from registry.
    #[error("HTTP error from registry: {status} - {message}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {source}")]
    JsonError {
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A manifest requested by digest does not exist.
    #[error("Manifest not found: {reference}")]
    ManifestNotFound {
        /// Tag or digest that was requested.
        reference: String,
    },

    /// The registry returned a manifest type that cannot be interpreted.
    #[error("Unsupported manifest media type '{media_type}' for {reference}")]
    UnsupportedMediaType {
        /// Media type returned by the registry.
        media_type: String,
        /// Tag or digest that was requested.
        reference: String,
    },

    /// A multi-platform index listed no manifests.
    #[error("Image index for {reference} contains no manifests")]
    EmptyIndex {
        /// Tag or digest that was requested.
        reference: String,
    },

    /// Invalid image repository reference.
    #[error("Invalid reference format: {reference}")]
    InvalidReference {
        /// Reference string.
        reference: String,
    },

    /// Invalid platform constraint.
    #[error("Invalid platform '{platform}': expected os/arch[/variant]")]
    InvalidPlatform {
        /// Platform string.
        platform: String,
    },

    /// A tag allow/ignore pattern does not compile.
    #[error("Invalid tag pattern '{pattern}': {source}")]
    InvalidTagPattern {
        /// The offending pattern.
        pattern: String,
        /// Underlying error.
        #[source]
        source: regex::Error,
    },

    /// A semantic version constraint does not parse.
    #[error("Invalid semver constraint '{constraint}': {source}")]
    InvalidConstraint {
        /// The offending constraint.
        constraint: String,
        /// Underlying error.
        #[source]
        source: semver::Error,
    },

    /// A selector needs a constraint the subscription does not set.
    #[error("{strategy} selection requires a constraint")]
    MissingConstraint {
        /// Strategy name.
        strategy: String,
    },

    /// No selector is registered for the subscription.
    #[error("No image selector registered for strategy {strategy}")]
    NoSelector {
        /// Strategy name.
        strategy: String,
    },

    /// Selector registration failed.
    #[error("Selector registration failed: {0}")]
    Registration(#[from] yardmaster_core::Error),

    /// The operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

impl RegistryError {
    /// Returns true if the operation may succeed when retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Cancelled => true,
            Self::HttpError { status, .. } => *status == 0 || *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::ConnectionFailed {
                url: err
                    .url()
                    .map_or_else(|| "unknown".to_string(), ToString::to_string),
                source: err,
            }
        } else {
            Self::HttpError {
                status: err.status().map_or(0, |s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError { source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_empty_index() {
        let err = RegistryError::EmptyIndex {
            reference: "1.0.0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Image index for 1.0.0 contains no manifests"
        );
    }

    #[test]
    fn test_error_display_auth_failed() {
        let err = RegistryError::AuthenticationFailed {
            message: "invalid token".to_string(),
        };
        assert_eq!(err.to_string(), "Authentication failed: invalid token");
    }

    #[test]
    fn test_is_retryable() {
        let throttled = RegistryError::HttpError {
            status: 429,
            message: "slow down".to_string(),
        };
        assert!(throttled.is_retryable());

        let unauthorized = RegistryError::HttpError {
            status: 401,
            message: "no".to_string(),
        };
        assert!(!unauthorized.is_retryable());
        assert!(!RegistryError::InvalidPlatform {
            platform: "linux".to_string()
        }
        .is_retryable());
    }
}
