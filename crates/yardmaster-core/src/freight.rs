//! The `Freight` custom resource and its content-addressed identity.
//!
//! A Freight's name is a hash of its origin and the artifacts it carries, so
//! creating the same artifact set twice yields the same name and the second
//! create is rejected by the store as already existing.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use kube::core::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::artifacts::{ArtifactReference, DiscoveredCommit, DiscoveredImageReference};

/// Label recording the Warehouse a Freight originated from.
pub const WAREHOUSE_LABEL: &str = "yardmaster.dev/warehouse";

/// An immutable bundle of one artifact per subscription.
#[derive(CustomResource, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "yardmaster.dev",
    version = "v1alpha1",
    kind = "Freight",
    plural = "freights",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct FreightSpec {
    /// Where the Freight came from.
    pub origin: FreightOrigin,

    /// Git commits.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commits: Vec<GitCommit>,

    /// Container images.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageReference>,

    /// Helm charts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<ChartReference>,

    /// Generic artifact references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactReference>,
}

impl FreightSpec {
    /// Creates an empty Freight originating from the named Warehouse.
    #[must_use]
    pub fn from_warehouse(name: impl Into<String>) -> Self {
        Self {
            origin: FreightOrigin {
                kind: FreightOriginKind::Warehouse,
                name: name.into(),
            },
            commits: Vec::new(),
            images: Vec::new(),
            charts: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    /// Returns true if the Freight carries no artifacts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
            && self.images.is_empty()
            && self.charts.is_empty()
            && self.artifacts.is_empty()
    }

    /// Computes the content-addressed identity of this Freight.
    ///
    /// The id is the hex SHA-256 of the origin followed by the sorted
    /// canonical form of every artifact, so it does not depend on the order
    /// subscriptions were listed in.
    ///
    /// # Examples
    ///
    /// ```
    /// use yardmaster_core::freight::{FreightSpec, ImageReference};
    ///
    /// let mut freight = FreightSpec::from_warehouse("app");
    /// freight.images.push(ImageReference {
    ///     repo_url: "ghcr.io/acme/api".to_string(),
    ///     tag: "1.2.0".to_string(),
    ///     digest: "sha256:abc".to_string(),
    ///     annotations: Default::default(),
    /// });
    /// let id = freight.generate_id();
    /// assert_eq!(id.len(), 64);
    /// assert_eq!(id, freight.generate_id());
    /// ```
    #[must_use]
    pub fn generate_id(&self) -> String {
        let mut keys: Vec<String> = self
            .commits
            .iter()
            .map(GitCommit::canonical)
            .chain(self.images.iter().map(ImageReference::canonical))
            .chain(self.charts.iter().map(ChartReference::canonical))
            .chain(self.artifacts.iter().map(|a| {
                format!("artifact:{}:{}", a.subscription_name, a.version)
            }))
            .collect();
        keys.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(self.origin.canonical().as_bytes());
        for key in &keys {
            hasher.update(b"\n");
            hasher.update(key.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl Freight {
    /// Builds the Freight object named after its identity.
    #[must_use]
    pub fn for_spec(namespace: impl Into<String>, spec: FreightSpec) -> Self {
        let id = spec.generate_id();
        let labels = BTreeMap::from([(WAREHOUSE_LABEL.to_string(), spec.origin.name.clone())]);
        Self {
            metadata: ObjectMeta {
                name: Some(id),
                namespace: Some(namespace.into()),
                labels: Some(labels),
                ..ObjectMeta::default()
            },
            spec,
        }
    }
}

/// Kind of object a Freight originated from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum FreightOriginKind {
    /// A Warehouse.
    #[default]
    Warehouse,
}

/// Origin of a Freight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FreightOrigin {
    /// Origin kind.
    pub kind: FreightOriginKind,
    /// Origin name.
    pub name: String,
}

impl FreightOrigin {
    fn canonical(&self) -> String {
        format!("{:?}/{}", self.kind, self.name)
    }
}

/// A Git commit carried by a Freight.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitCommit {
    /// Repository URL.
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    /// Commit hash.
    pub id: String,
    /// Branch, when selected by branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Tag, when selected by tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Commit subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Committer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer: Option<String>,
}

impl GitCommit {
    /// Builds a Freight commit from a discovered one.
    #[must_use]
    pub fn from_discovered(repo_url: &str, commit: &DiscoveredCommit) -> Self {
        Self {
            repo_url: repo_url.to_string(),
            id: commit.id.clone(),
            branch: commit.branch.clone(),
            tag: commit.tag.clone(),
            message: commit.subject.clone(),
            author: commit.author.clone(),
            committer: commit.committer.clone(),
        }
    }

    fn canonical(&self) -> String {
        format!("git:{}:{}", self.repo_url, self.id)
    }
}

/// A container image carried by a Freight.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageReference {
    /// Repository URL.
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    /// Tag at discovery time.
    pub tag: String,
    /// Content digest.
    pub digest: String,
    /// Image annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ImageReference {
    /// Builds a Freight image from a discovered reference.
    #[must_use]
    pub fn from_discovered(repo_url: &str, reference: &DiscoveredImageReference) -> Self {
        Self {
            repo_url: repo_url.to_string(),
            tag: reference.tag.clone(),
            digest: reference.digest.clone(),
            annotations: reference.annotations.clone(),
        }
    }

    fn canonical(&self) -> String {
        // Digest is identity; the tag may move.
        format!("image:{}@{}", self.repo_url, self.digest)
    }
}

/// A Helm chart carried by a Freight.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartReference {
    /// Repository URL.
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    /// Chart name; unset for OCI repositories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Chart version.
    pub version: String,
}

impl ChartReference {
    fn canonical(&self) -> String {
        let mut key = format!("chart:{}", self.repo_url);
        if let Some(name) = &self.name {
            let _ = write!(key, "/{name}");
        }
        let _ = write!(key, ":{}", self.version);
        key
    }
}
