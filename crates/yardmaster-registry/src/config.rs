//! Configuration types for registry access.

use std::fmt;
use std::time::Duration;

use crate::error::{RegistryError, Result};

/// Registry host that serves Docker Hub's API.
pub const DOCKER_HUB_HOST: &str = "registry-1.docker.io";

/// Configuration for talking to one registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Authentication method.
    pub auth: RegistryAuth,

    /// Request timeout.
    pub timeout: Duration,

    /// Whether to skip certificate verification.
    pub insecure_skip_tls_verify: bool,

    /// User agent string.
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryConfig {
    /// Creates a configuration with anonymous access and a 30 second timeout.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use yardmaster_registry::RegistryConfig;
    ///
    /// let config = RegistryConfig::new();
    /// assert_eq!(config.timeout, Duration::from_secs(30));
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            auth: RegistryAuth::None,
            timeout: Duration::from_secs(30),
            insecure_skip_tls_verify: false,
            user_agent: format!("yardmaster/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Sets the authentication method.
    #[must_use]
    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Skips TLS certificate verification.
    #[must_use]
    pub const fn with_insecure_skip_tls_verify(mut self, insecure: bool) -> Self {
        self.insecure_skip_tls_verify = insecure;
        self
    }
}

/// Authentication methods for registry access.
#[derive(Clone, PartialEq, Eq)]
pub enum RegistryAuth {
    /// Anonymous access. Registries that demand a token still get the
    /// anonymous token challenge.
    None,

    /// Basic authentication (username/password or username/token).
    Basic {
        /// Username.
        username: String,
        /// Password or token.
        password: String,
    },

    /// Pre-issued bearer token.
    Bearer {
        /// Token value.
        token: String,
    },
}

impl RegistryAuth {
    /// Creates basic authentication.
    ///
    /// # Examples
    ///
    /// ```
    /// use yardmaster_registry::RegistryAuth;
    ///
    /// let auth = RegistryAuth::basic("user", "pass");
    /// ```
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates bearer token authentication.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// A parsed image repository reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    /// URL scheme, `https` unless the reference spelled out `http://`.
    pub scheme: String,
    /// Registry host, with port if any.
    pub host: String,
    /// Repository path within the registry.
    pub path: String,
}

impl RepositoryRef {
    /// Parses a repository URL such as `nginx`, `ghcr.io/acme/api` or
    /// `localhost:5000/team/app`.
    ///
    /// Docker Hub short names are normalized: `nginx` becomes
    /// `registry-1.docker.io/library/nginx`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] for empty references or
    /// references carrying a tag or digest.
    ///
    /// # Examples
    ///
    /// ```
    /// use yardmaster_registry::RepositoryRef;
    ///
    /// let repo = RepositoryRef::parse("nginx").unwrap();
    /// assert_eq!(repo.host, "registry-1.docker.io");
    /// assert_eq!(repo.path, "library/nginx");
    /// ```
    pub fn parse(repo_url: &str) -> Result<Self> {
        let invalid = || RegistryError::InvalidReference {
            reference: repo_url.to_string(),
        };

        let trimmed = repo_url.trim().trim_end_matches('/');
        let (scheme, rest) = if let Some(rest) = trimmed.strip_prefix("http://") {
            ("http", rest)
        } else if let Some(rest) = trimmed.strip_prefix("https://") {
            ("https", rest)
        } else {
            ("https", trimmed.strip_prefix("oci://").unwrap_or(trimmed))
        };
        if rest.is_empty() || rest.contains('@') {
            return Err(invalid());
        }

        let (host, path) = match rest.split_once('/') {
            Some((first, path))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), path.to_string())
            }
            _ => (DOCKER_HUB_HOST.to_string(), rest.to_string()),
        };
        if path.is_empty() || path.rsplit('/').next().is_some_and(|last| last.contains(':')) {
            return Err(invalid());
        }

        let host = if host == "docker.io" || host == "index.docker.io" {
            DOCKER_HUB_HOST.to_string()
        } else {
            host
        };
        let path = if host == DOCKER_HUB_HOST && !path.contains('/') {
            format!("library/{path}")
        } else {
            path
        };

        Ok(Self {
            scheme: scheme.to_string(),
            host,
            path,
        })
    }

    /// Returns the base URL of the registry API, e.g. `https://ghcr.io/v2`.
    #[must_use]
    pub fn api_base(&self) -> String {
        format!("{}://{}/v2", self.scheme, self.host)
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_docker_hub_short_names() {
        let repo = RepositoryRef::parse("nginx").unwrap();
        assert_eq!(repo.to_string(), "registry-1.docker.io/library/nginx");

        let repo = RepositoryRef::parse("bitnami/redis").unwrap();
        assert_eq!(repo.to_string(), "registry-1.docker.io/bitnami/redis");

        let repo = RepositoryRef::parse("docker.io/library/alpine").unwrap();
        assert_eq!(repo.to_string(), "registry-1.docker.io/library/alpine");
    }

    #[test]
    fn test_parse_custom_registries() {
        let repo = RepositoryRef::parse("ghcr.io/acme/api").unwrap();
        assert_eq!(repo.host, "ghcr.io");
        assert_eq!(repo.path, "acme/api");
        assert_eq!(repo.api_base(), "https://ghcr.io/v2");

        let repo = RepositoryRef::parse("localhost:5000/app").unwrap();
        assert_eq!(repo.host, "localhost:5000");

        let repo = RepositoryRef::parse("http://127.0.0.1:8080/team/app").unwrap();
        assert_eq!(repo.api_base(), "http://127.0.0.1:8080/v2");
        assert_eq!(repo.path, "team/app");

        let repo = RepositoryRef::parse("oci://ghcr.io/acme/charts/api").unwrap();
        assert_eq!(repo.path, "acme/charts/api");
    }

    #[test]
    fn test_parse_rejects_tags_and_digests() {
        assert!(RepositoryRef::parse("").is_err());
        assert!(RepositoryRef::parse("nginx:1.25").is_err());
        assert!(RepositoryRef::parse("ghcr.io/acme/api@sha256:abc").is_err());
    }

    #[test]
    fn test_auth_debug_redacts_secrets() {
        let rendered = format!("{:?}", RegistryAuth::basic("user", "hunter2"));
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("hunter2"));
    }
}
