//! Discovery results recorded in Warehouse status.
//!
//! Every result list is ordered best-first: index 0 is the candidate a new
//! Freight is built from.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Aggregated results of one discovery cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredArtifacts {
    /// When discovery completed; `None` means never.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_at: Option<DateTime<Utc>>,

    /// One entry per Git subscription.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub git: Vec<GitDiscoveryResult>,

    /// One entry per image subscription.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageDiscoveryResult>,

    /// One entry per chart subscription.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<ChartDiscoveryResult>,

    /// One entry per generic subscription.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<GenericDiscoveryResult>,
}

impl DiscoveredArtifacts {
    /// Returns true if no subscription produced a result entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.git.is_empty()
            && self.images.is_empty()
            && self.charts.is_empty()
            && self.results.is_empty()
    }

    /// Counts individual artifacts across all result lists.
    #[must_use]
    pub fn total(&self) -> usize {
        self.git.iter().map(|r| r.commits.len()).sum::<usize>()
            + self.images.iter().map(|r| r.references.len()).sum::<usize>()
            + self.charts.iter().map(|r| r.versions.len()).sum::<usize>()
            + self.results.iter().map(|r| r.references.len()).sum::<usize>()
    }
}

/// Commits discovered in one Git repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitDiscoveryResult {
    /// Repository URL.
    #[serde(rename = "repoURL")]
    pub repo_url: String,

    /// Commits, best first.
    #[serde(default)]
    pub commits: Vec<DiscoveredCommit>,
}

/// A commit discovered in a Git repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredCommit {
    /// Full commit hash.
    pub id: String,

    /// Branch the commit was found on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Tag pointing at the commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// First line of the commit message, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Commit author, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Commit committer, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer: Option<String>,

    /// Creation time of the commit or tag, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_date: Option<DateTime<Utc>>,
}

/// Images discovered in one repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageDiscoveryResult {
    /// Repository URL as written in the subscription.
    #[serde(rename = "repoURL")]
    pub repo_url: String,

    /// Platform constraint the references were filtered by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Image references, best first.
    #[serde(default)]
    pub references: Vec<DiscoveredImageReference>,
}

/// A tag/digest pair discovered in an image repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredImageReference {
    /// Tag at discovery time.
    pub tag: String,

    /// Content digest (`sha256:...`).
    pub digest: String,

    /// Merged manifest annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Image creation time, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Chart versions discovered in one repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartDiscoveryResult {
    /// Repository URL.
    #[serde(rename = "repoURL")]
    pub repo_url: String,

    /// Chart name; unset for OCI repositories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Versions, best first.
    #[serde(default)]
    pub versions: Vec<String>,
}

/// Artifact references produced by a generic source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenericDiscoveryResult {
    /// Subscription name.
    pub name: String,

    /// Generic source kind.
    pub kind: String,

    /// References, best first.
    #[serde(default)]
    pub references: Vec<ArtifactReference>,
}

/// A versioned reference to an artifact from a generic source.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactReference {
    /// Name of the subscription that produced the reference.
    pub subscription_name: String,

    /// Opaque version identifier.
    pub version: String,

    /// Source-specific metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}
