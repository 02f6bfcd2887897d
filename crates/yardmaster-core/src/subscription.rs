//! Subscriptions: a Warehouse's declared interest in one artifact source.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::validation::{Validate, ValidationError, ValidationErrors};

/// Smallest accepted discovery limit.
pub const MIN_DISCOVERY_LIMIT: u32 = 1;

/// Largest accepted discovery limit.
pub const MAX_DISCOVERY_LIMIT: u32 = 100;

/// Discovery limit used when a subscription does not set one.
pub const DEFAULT_DISCOVERY_LIMIT: u32 = 20;

const fn default_discovery_limit() -> u32 {
    DEFAULT_DISCOVERY_LIMIT
}

const fn default_true() -> bool {
    true
}

/// A subscription to exactly one artifact source.
///
/// Serialized externally tagged, e.g. `{"image": {"repoURL": "nginx"}}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Subscription {
    /// Git repository subscription.
    Git(GitSubscription),
    /// Container image repository subscription.
    Image(ImageSubscription),
    /// Helm chart repository subscription.
    Chart(ChartSubscription),
    /// Subscription served by a registered generic source.
    Generic(GenericSubscription),
}

impl Subscription {
    /// Returns the kind of this subscription.
    #[must_use]
    pub const fn kind(&self) -> SubscriptionKind {
        match self {
            Self::Git(_) => SubscriptionKind::Git,
            Self::Image(_) => SubscriptionKind::Image,
            Self::Chart(_) => SubscriptionKind::Chart,
            Self::Generic(_) => SubscriptionKind::Generic,
        }
    }

    /// Returns a human-readable identifier for logs and status messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Git(git) => format!("git repository {}", git.repo_url),
            Self::Image(image) => format!("image repository {}", image.repo_url),
            Self::Chart(chart) => match &chart.name {
                Some(name) => format!("chart {name} in {}", chart.repo_url),
                None => format!("chart repository {}", chart.repo_url),
            },
            Self::Generic(generic) => format!("{} subscription {}", generic.kind, generic.name),
        }
    }

    /// Returns the configured discovery limit.
    #[must_use]
    pub const fn discovery_limit(&self) -> u32 {
        match self {
            Self::Git(git) => git.discovery_limit,
            Self::Image(image) => image.discovery_limit,
            Self::Chart(chart) => chart.discovery_limit,
            Self::Generic(generic) => generic.discovery_limit,
        }
    }
}

impl Validate for Subscription {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let kind = self.kind().as_str();
        let limit = self.discovery_limit();
        if !(MIN_DISCOVERY_LIMIT..=MAX_DISCOVERY_LIMIT).contains(&limit) {
            errors.add(
                ValidationError::range(
                    "discoveryLimit",
                    format!(
                        "must be between {MIN_DISCOVERY_LIMIT} and {MAX_DISCOVERY_LIMIT}, got {limit}"
                    ),
                )
                .nested(kind),
            );
        }

        match self {
            Self::Git(git) => {
                if git.repo_url.trim().is_empty() {
                    errors.add(ValidationError::empty("repoURL").nested(kind));
                }
            }
            Self::Image(image) => {
                if image.repo_url.trim().is_empty() {
                    errors.add(ValidationError::empty("repoURL").nested(kind));
                }
                if image.image_selection_strategy == ImageSelectionStrategy::Digest
                    && image.constraint.as_deref().is_none_or(str::is_empty)
                {
                    errors.add(
                        ValidationError::format(
                            "constraint",
                            "the Digest strategy requires a tag in 'constraint'",
                        )
                        .nested(kind),
                    );
                }
            }
            Self::Chart(chart) => {
                if chart.repo_url.trim().is_empty() {
                    errors.add(ValidationError::empty("repoURL").nested(kind));
                }
                if !chart.is_oci() && chart.name.as_deref().is_none_or(str::is_empty) {
                    errors.add(ValidationError::required("name").nested(kind));
                }
            }
            Self::Generic(generic) => {
                if generic.kind.trim().is_empty() {
                    errors.add(ValidationError::empty("kind").nested(kind));
                }
                if generic.name.trim().is_empty() {
                    errors.add(ValidationError::empty("name").nested(kind));
                }
            }
        }

        errors.into_result()
    }
}

/// Discriminant of a [`Subscription`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    /// Git repository.
    Git,
    /// Container image repository.
    Image,
    /// Helm chart repository.
    Chart,
    /// Generic source.
    Generic,
}

impl SubscriptionKind {
    /// Returns the wire name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Image => "image",
            Self::Chart => "chart",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How commits are selected from a Git repository.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CommitSelectionStrategy {
    /// The head of a branch.
    #[default]
    NewestFromBranch,
    /// Tags parsed as semantic versions, highest first.
    SemVer,
    /// Tags in descending lexical order.
    Lexical,
}

/// Subscription to a Git repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitSubscription {
    /// Repository URL.
    #[serde(rename = "repoURL")]
    pub repo_url: String,

    /// Commit selection strategy.
    #[serde(default)]
    pub commit_selection_strategy: CommitSelectionStrategy,

    /// Branch to follow (`NewestFromBranch`); the remote HEAD when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Semantic version range tags must satisfy (`SemVer`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semver_constraint: Option<String>,

    /// Reject partial versions such as `1.0`.
    #[serde(default = "default_true")]
    pub strict_semvers: bool,

    /// Regular expressions a tag must match (any).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_tags: Vec<String>,

    /// Regular expressions excluding a tag (any).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_tags: Vec<String>,

    /// Maximum number of commits to keep.
    #[serde(default = "default_discovery_limit")]
    pub discovery_limit: u32,

    /// Skip TLS verification when talking to the remote.
    #[serde(default, rename = "insecureSkipTLSVerify")]
    pub insecure_skip_tls_verify: bool,
}

impl GitSubscription {
    /// Creates a subscription following the remote's default branch.
    #[must_use]
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            commit_selection_strategy: CommitSelectionStrategy::default(),
            branch: None,
            semver_constraint: None,
            strict_semvers: true,
            allow_tags: Vec::new(),
            ignore_tags: Vec::new(),
            discovery_limit: DEFAULT_DISCOVERY_LIMIT,
            insecure_skip_tls_verify: false,
        }
    }

    /// Sets the branch to follow.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Sets the commit selection strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: CommitSelectionStrategy) -> Self {
        self.commit_selection_strategy = strategy;
        self
    }
}

/// How images are selected from a container image repository.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ImageSelectionStrategy {
    /// One exact, possibly mutable tag.
    Digest,
    /// Tags in descending lexical order.
    Lexical,
    /// Most recently built images first.
    NewestBuild,
    /// Tags parsed as semantic versions, highest first.
    #[default]
    SemVer,
}

impl fmt::Display for ImageSelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Digest => "Digest",
            Self::Lexical => "Lexical",
            Self::NewestBuild => "NewestBuild",
            Self::SemVer => "SemVer",
        };
        f.write_str(name)
    }
}

/// Subscription to a container image repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSubscription {
    /// Repository URL, e.g. `ghcr.io/acme/api` or `nginx`.
    #[serde(rename = "repoURL")]
    pub repo_url: String,

    /// Image selection strategy.
    #[serde(default)]
    pub image_selection_strategy: ImageSelectionStrategy,

    /// Semver range (`SemVer`) or exact tag (`Digest`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,

    /// Reject partial versions such as `1.0`.
    #[serde(default = "default_true")]
    pub strict_semvers: bool,

    /// Regular expressions a tag must match (any).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_tags: Vec<String>,

    /// Regular expressions excluding a tag (any).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_tags: Vec<String>,

    /// Platform constraint, `os/arch[/variant]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Maximum number of images to keep.
    #[serde(default = "default_discovery_limit")]
    pub discovery_limit: u32,

    /// Cache image metadata by tag. Tags are mutable; only enable this for
    /// repositories that never re-push a tag.
    #[serde(default)]
    pub cache_by_tag: bool,

    /// Skip TLS verification when talking to the registry.
    #[serde(default, rename = "insecureSkipTLSVerify")]
    pub insecure_skip_tls_verify: bool,
}

impl ImageSubscription {
    /// Creates a `SemVer` subscription with default settings.
    #[must_use]
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            image_selection_strategy: ImageSelectionStrategy::default(),
            constraint: None,
            strict_semvers: true,
            allow_tags: Vec::new(),
            ignore_tags: Vec::new(),
            platform: None,
            discovery_limit: DEFAULT_DISCOVERY_LIMIT,
            cache_by_tag: false,
            insecure_skip_tls_verify: false,
        }
    }

    /// Sets the selection strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: ImageSelectionStrategy) -> Self {
        self.image_selection_strategy = strategy;
        self
    }

    /// Sets the constraint.
    #[must_use]
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    /// Sets the platform constraint.
    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Sets the discovery limit.
    #[must_use]
    pub const fn with_discovery_limit(mut self, limit: u32) -> Self {
        self.discovery_limit = limit;
        self
    }
}

/// Subscription to a Helm chart repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartSubscription {
    /// Repository URL: an HTTP(S) chart repository or `oci://` reference.
    #[serde(rename = "repoURL")]
    pub repo_url: String,

    /// Chart name; required for HTTP(S) repositories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Semantic version range versions must satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semver_constraint: Option<String>,

    /// Maximum number of versions to keep.
    #[serde(default = "default_discovery_limit")]
    pub discovery_limit: u32,
}

impl ChartSubscription {
    /// Returns true if the repository is an OCI registry.
    #[must_use]
    pub fn is_oci(&self) -> bool {
        self.repo_url.starts_with("oci://")
    }
}

/// Subscription served by a generic source registered under `kind`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenericSubscription {
    /// Source kind; selects the registered generic source.
    pub kind: String,

    /// Subscription name, unique within the Warehouse.
    pub name: String,

    /// Source-specific parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,

    /// Maximum number of artifact references to keep.
    #[serde(default = "default_discovery_limit")]
    pub discovery_limit: u32,
}
