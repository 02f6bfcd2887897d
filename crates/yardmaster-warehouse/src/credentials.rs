//! Repository credentials lookup.
//!
//! Subscribers ask a [`CredentialsDatabase`] for credentials before talking to
//! a repository. An absent answer means "proceed unauthenticated".

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams};
use kube::Client;
use regex::Regex;

use crate::error::{Result, WarehouseError};

/// Label selecting credential Secrets; its value is the [`CredentialType`].
pub const CREDENTIAL_TYPE_LABEL: &str = "yardmaster.dev/cred-type";

/// Kind of repository credentials are requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialType {
    /// Git repositories.
    Git,
    /// Helm chart repositories.
    Helm,
    /// Container image registries.
    Image,
}

impl CredentialType {
    /// Returns the label value for this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Helm => "helm",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Username and password (or token) for a repository.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password or token.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Looks up credentials for a repository.
#[async_trait]
pub trait CredentialsDatabase: Send + Sync {
    /// Returns credentials for `repo_url`, or `None` to proceed
    /// unauthenticated.
    async fn get(
        &self,
        namespace: &str,
        cred_type: CredentialType,
        repo_url: &str,
    ) -> Result<Option<Credentials>>;
}

/// Credentials held in memory, keyed by type and repository URL.
///
/// Exact entries take precedence over pattern entries. Entries are global
/// across namespaces.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    exact: BTreeMap<(CredentialType, String), Credentials>,
    patterns: Vec<(CredentialType, Regex, Credentials)>,
}

impl StaticCredentials {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds credentials for one repository URL.
    #[must_use]
    pub fn with(
        mut self,
        cred_type: CredentialType,
        repo_url: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        self.exact
            .insert((cred_type, normalize_url(&repo_url.into())), credentials);
        self
    }

    /// Adds credentials for every repository URL matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern does not compile.
    pub fn with_pattern(
        mut self,
        cred_type: CredentialType,
        pattern: &str,
        credentials: Credentials,
    ) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| WarehouseError::Credentials {
            repo_url: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.patterns.push((cred_type, regex, credentials));
        Ok(self)
    }

    fn lookup(&self, cred_type: CredentialType, repo_url: &str) -> Option<Credentials> {
        let normalized = normalize_url(repo_url);
        self.exact
            .get(&(cred_type, normalized.clone()))
            .or_else(|| {
                self.patterns
                    .iter()
                    .find(|(t, re, _)| *t == cred_type && re.is_match(&normalized))
                    .map(|(_, _, c)| c)
            })
            .cloned()
    }
}

#[async_trait]
impl CredentialsDatabase for StaticCredentials {
    async fn get(
        &self,
        _namespace: &str,
        cred_type: CredentialType,
        repo_url: &str,
    ) -> Result<Option<Credentials>> {
        Ok(self.lookup(cred_type, repo_url))
    }
}

/// Credentials stored in labelled Kubernetes Secrets.
///
/// A Secret labelled `yardmaster.dev/cred-type=<type>` in the Warehouse's
/// namespace provides `username` and `password` for the repository named by
/// its `repoURL` key, or for every repository matching its `repoURLPattern`
/// key.
#[derive(Clone)]
pub struct KubernetesCredentials {
    client: Client,
}

impl fmt::Debug for KubernetesCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubernetesCredentials").finish_non_exhaustive()
    }
}

impl KubernetesCredentials {
    /// Creates a database backed by the cluster.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialsDatabase for KubernetesCredentials {
    async fn get(
        &self,
        namespace: &str,
        cred_type: CredentialType,
        repo_url: &str,
    ) -> Result<Option<Credentials>> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let selector = format!("{CREDENTIAL_TYPE_LABEL}={cred_type}");
        let list = secrets
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| WarehouseError::Credentials {
                repo_url: repo_url.to_string(),
                reason: e.to_string(),
            })?;

        let mut entries: Vec<SecretEntry> = list.items.iter().filter_map(SecretEntry::from_secret).collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(match_entries(&entries, repo_url))
    }
}

/// Decoded contents of one credential Secret.
#[derive(Debug, Clone)]
struct SecretEntry {
    name: String,
    repo_url: Option<String>,
    pattern: Option<String>,
    credentials: Credentials,
}

impl SecretEntry {
    fn from_secret(secret: &Secret) -> Option<Self> {
        let data = secret.data.as_ref()?;
        let read = |key: &str| {
            data.get(key)
                .and_then(|v| String::from_utf8(v.0.clone()).ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Some(Self {
            name: secret.metadata.name.clone().unwrap_or_default(),
            repo_url: read("repoURL"),
            pattern: read("repoURLPattern"),
            credentials: Credentials::new(read("username")?, read("password")?),
        })
    }
}

/// Picks the first exact match, else the first pattern match.
fn match_entries(entries: &[SecretEntry], repo_url: &str) -> Option<Credentials> {
    let normalized = normalize_url(repo_url);
    entries
        .iter()
        .find(|e| e.repo_url.as_deref().map(normalize_url).as_deref() == Some(normalized.as_str()))
        .or_else(|| {
            entries.iter().find(|e| {
                e.pattern.as_deref().is_some_and(|p| match Regex::new(p) {
                    Ok(re) => re.is_match(&normalized),
                    Err(err) => {
                        tracing::warn!(secret = %e.name, error = %err, "Ignoring invalid repoURLPattern");
                        false
                    }
                })
            })
        })
        .map(|e| e.credentials.clone())
}

/// Normalizes a repository URL for comparison.
fn normalize_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url);
    url.to_ascii_lowercase()
}
