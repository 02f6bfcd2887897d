//! Helm chart repository subscriber.
//!
//! HTTP(S) repositories publish an `index.yaml` listing every chart version.
//! `oci://` repositories store each version as a tag of the chart's
//! repository, with `+` spelled `_`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use yardmaster_core::{ChartDiscoveryResult, ChartSubscription};
use yardmaster_registry::{parse_version, RegistryAuth, RepositoryRef, VersionConstraint};

use super::image::ImageBackendFactory;
use super::{DiscoveryResult, Subscriber, SubscriberDeps};
use crate::credentials::{CredentialType, Credentials};
use crate::error::{Result, WarehouseError};

/// Lists the versions of a chart.
#[async_trait]
pub trait ChartDiscoverer: Send + Sync + fmt::Debug {
    /// Returns every published version of the subscribed chart, unordered.
    async fn versions(
        &self,
        subscription: &ChartSubscription,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct IndexFile {
    #[serde(default)]
    entries: HashMap<String, Vec<IndexEntry>>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    version: String,
}

/// Reads HTTP(S) chart repositories and OCI chart registries.
#[derive(Debug, Clone)]
pub struct HelmRepositories {
    http: reqwest::Client,
    oci: Arc<dyn ImageBackendFactory>,
}

impl HelmRepositories {
    /// Creates a discoverer reading OCI charts through `oci`.
    #[must_use]
    pub fn new(oci: Arc<dyn ImageBackendFactory>) -> Self {
        Self {
            http: reqwest::Client::new(),
            oci,
        }
    }

    async fn http_versions(
        &self,
        subscription: &ChartSubscription,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let chart_error = |reason: String| WarehouseError::Chart {
            repo_url: subscription.repo_url.clone(),
            reason,
        };
        let name = subscription
            .name
            .as_deref()
            .ok_or_else(|| WarehouseError::InvalidSubscription {
                reason: format!(
                    "chart repository {} requires a chart name",
                    subscription.repo_url
                ),
            })?;

        let url = format!("{}/index.yaml", subscription.repo_url.trim_end_matches('/'));
        let body = tokio::select! {
            () = cancel.cancelled() => return Err(WarehouseError::Cancelled),
            body = self.fetch(&url, credentials) => body.map_err(chart_error)?,
        };

        let index: IndexFile = serde_yaml::from_str(&body)
            .map_err(|e| chart_error(format!("invalid index.yaml: {e}")))?;
        Ok(index
            .entries
            .get(name)
            .map(|entries| entries.iter().map(|e| e.version.clone()).collect())
            .unwrap_or_default())
    }

    async fn fetch(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> std::result::Result<String, String> {
        let mut request = self.http.get(url);
        if let Some(credentials) = credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }
        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("GET {url} returned {status}"));
        }
        response.text().await.map_err(|e| e.to_string())
    }

    async fn oci_versions(
        &self,
        subscription: &ChartSubscription,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let mut reference = subscription.repo_url.trim_end_matches('/').to_string();
        if let Some(name) = subscription.name.as_deref().filter(|n| !n.is_empty()) {
            reference = format!("{reference}/{name}");
        }
        let repo = RepositoryRef::parse(&reference)?;
        let auth = credentials.map_or(RegistryAuth::None, |c| {
            RegistryAuth::basic(c.username.clone(), c.password.clone())
        });
        let backend = self.oci.backend(&repo, auth, false)?;

        let tags = tokio::select! {
            () = cancel.cancelled() => return Err(WarehouseError::Cancelled),
            tags = backend.list_tags() => tags?,
        };
        Ok(tags.into_iter().map(|t| t.replace('_', "+")).collect())
    }
}

#[async_trait]
impl ChartDiscoverer for HelmRepositories {
    async fn versions(
        &self,
        subscription: &ChartSubscription,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        if subscription.is_oci() {
            self.oci_versions(subscription, credentials, cancel).await
        } else {
            self.http_versions(subscription, credentials, cancel).await
        }
    }
}

/// Keeps the semantic versions satisfying `constraint`, highest first.
///
/// # Errors
///
/// Returns an error if the constraint is invalid.
///
/// # Examples
///
/// ```
/// use yardmaster_warehouse::subscriber::chart::select_versions;
///
/// let versions = vec!["1.0.0".into(), "1.10.0".into(), "1.9.0".into(), "latest".into()];
/// assert_eq!(
///     select_versions(versions, Some("<1.10"), 10).unwrap(),
///     vec!["1.9.0", "1.0.0"]
/// );
/// ```
pub fn select_versions(
    versions: Vec<String>,
    constraint: Option<&str>,
    limit: usize,
) -> Result<Vec<String>> {
    let constraint = constraint
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(VersionConstraint::parse)
        .transpose()?;

    let mut parsed: Vec<_> = versions
        .into_iter()
        .filter_map(|v| {
            let version = parse_version(&v, true)?;
            constraint
                .as_ref()
                .is_none_or(|c| c.matches(&version))
                .then_some((version, v))
        })
        .collect();
    parsed.sort_by(|(va, a), (vb, b)| vb.cmp_precedence(va).then_with(|| b.cmp(a)));
    parsed.dedup_by(|(_, a), (_, b)| a == b);
    parsed.truncate(limit);

    Ok(parsed.into_iter().map(|(_, v)| v).collect())
}

/// Discovers chart versions for a [`ChartSubscription`].
#[derive(Debug)]
pub struct ChartSubscriber {
    subscription: ChartSubscription,
    namespace: String,
    deps: SubscriberDeps,
}

impl ChartSubscriber {
    /// Creates a subscriber.
    #[must_use]
    pub fn new(subscription: ChartSubscription, namespace: impl Into<String>, deps: SubscriberDeps) -> Self {
        Self {
            subscription,
            namespace: namespace.into(),
            deps,
        }
    }
}

#[async_trait]
impl Subscriber for ChartSubscriber {
    async fn discover(&self, cancel: &CancellationToken) -> Result<DiscoveryResult> {
        let sub = &self.subscription;
        let credentials = self
            .deps
            .credentials
            .get(&self.namespace, CredentialType::Helm, &sub.repo_url)
            .await?;
        let versions = self
            .deps
            .charts
            .versions(sub, credentials.as_ref(), cancel)
            .await?;

        let limit = usize::try_from(sub.discovery_limit).unwrap_or(usize::MAX);
        let versions = select_versions(versions, sub.semver_constraint.as_deref(), limit)?;
        tracing::debug!(
            repo_url = %sub.repo_url,
            chart = sub.name.as_deref().unwrap_or_default(),
            discovered = versions.len(),
            "Discovered chart versions"
        );

        Ok(DiscoveryResult::Chart(ChartDiscoveryResult {
            repo_url: sub.repo_url.clone(),
            name: sub.name.clone(),
            versions,
        }))
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use yardmaster_core::subscription::DEFAULT_DISCOVERY_LIMIT;
    use yardmaster_registry::{MemoryBackend, MemoryImage};

    use super::*;
    use crate::subscriber::image::MemoryBackends;

    const INDEX: &str = r"
apiVersion: v1
entries:
  api:
    - version: 0.3.0
    - version: 0.10.0
    - version: 0.9.1
  worker:
    - version: 1.0.0
";

    fn chart(repo_url: &str, name: Option<&str>) -> ChartSubscription {
        ChartSubscription {
            repo_url: repo_url.to_string(),
            name: name.map(str::to_string),
            semver_constraint: None,
            discovery_limit: DEFAULT_DISCOVERY_LIMIT,
        }
    }

    fn helm() -> HelmRepositories {
        HelmRepositories::new(Arc::new(MemoryBackends::new()))
    }

    #[tokio::test]
    async fn test_http_index() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/charts/index.yaml"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_string(INDEX))
            .mount(&server)
            .await;

        let sub = chart(&format!("{}/charts/", server.uri()), Some("api"));
        let creds = Credentials::new("user", "pass");
        let versions = helm()
            .versions(&sub, Some(&creds), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(versions, vec!["0.3.0", "0.10.0", "0.9.1"]);

        let missing = chart(&format!("{}/charts", server.uri()), Some("absent"));
        let versions = helm()
            .versions(&missing, Some(&creds), &CancellationToken::new())
            .await
            .unwrap();
        assert!(versions.is_empty());
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let sub = chart(&server.uri(), Some("api"));
        let err = helm()
            .versions(&sub, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WarehouseError::Chart { .. }));
    }

    #[tokio::test]
    async fn test_oci_tags() {
        let backends = Arc::new(MemoryBackends::new());
        backends
            .insert(
                "ghcr.io/acme/charts/api",
                Arc::new(
                    MemoryBackend::new()
                        .with_image("1.0.0", MemoryImage::new("sha256:a", None))
                        .with_image("1.1.0_build.7", MemoryImage::new("sha256:b", None)),
                ),
            )
            .unwrap();
        let helm = HelmRepositories::new(backends);

        let sub = chart("oci://ghcr.io/acme/charts", Some("api"));
        let versions = helm
            .versions(&sub, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(versions, vec!["1.0.0", "1.1.0+build.7"]);
    }

    #[test]
    fn test_select_versions() {
        let versions = ["0.3.0", "0.10.0", "0.9.1", "not-a-version", "0.10.0"]
            .map(String::from)
            .to_vec();
        assert_eq!(
            select_versions(versions.clone(), None, 20).unwrap(),
            vec!["0.10.0", "0.9.1", "0.3.0"]
        );
        assert_eq!(
            select_versions(versions.clone(), Some("~0.9"), 20).unwrap(),
            vec!["0.9.1"]
        );
        assert_eq!(select_versions(versions.clone(), None, 1).unwrap(), vec!["0.10.0"]);
        assert!(select_versions(versions, Some("not a range"), 1).is_err());
    }
}
