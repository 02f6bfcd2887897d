//! The `Warehouse` custom resource.

use std::collections::HashSet;
use std::time::Duration;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::artifacts::DiscoveredArtifacts;
use crate::conditions::Conditions;
use crate::duration::parse_duration;
use crate::error::Result;
use crate::subscription::Subscription;
use crate::validation::{Validate, ValidationError, ValidationErrors};

/// API group of all Yardmaster resources.
pub const API_GROUP: &str = "yardmaster.dev";

/// Annotation whose value changes to request an immediate re-discovery.
pub const REFRESH_ANNOTATION: &str = "yardmaster.dev/refresh";

/// Default re-discovery interval.
pub const DEFAULT_INTERVAL: &str = "5m0s";

fn default_interval() -> String {
    DEFAULT_INTERVAL.to_string()
}

/// Desired state of a Warehouse.
#[derive(CustomResource, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "yardmaster.dev",
    version = "v1alpha1",
    kind = "Warehouse",
    namespaced,
    status = "WarehouseStatus",
    shortname = "wh"
)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseSpec {
    /// Artifact sources, in order.
    pub subscriptions: Vec<Subscription>,

    /// Re-discovery interval as a duration string.
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Whether Freight is created automatically.
    #[serde(default)]
    pub freight_creation_policy: FreightCreationPolicy,

    /// Optional gate on automatic Freight creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freight_creation_criteria: Option<FreightCreationCriteria>,
}

impl WarehouseSpec {
    /// Creates a spec with the default interval and automatic policy.
    #[must_use]
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        Self {
            subscriptions,
            interval: default_interval(),
            freight_creation_policy: FreightCreationPolicy::default(),
            freight_creation_criteria: None,
        }
    }

    /// Parses the re-discovery interval.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval is not a valid duration string.
    pub fn interval(&self) -> Result<Duration> {
        parse_duration(&self.interval)
    }

    /// Returns the criteria expression, if one is configured and non-blank.
    #[must_use]
    pub fn criteria_expression(&self) -> Option<&str> {
        self.freight_creation_criteria
            .as_ref()
            .map(|c| c.expression.trim())
            .filter(|e| !e.is_empty())
    }
}

impl Validate for WarehouseSpec {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.subscriptions.is_empty() {
            errors.add(ValidationError::empty("subscriptions"));
        }
        if let Err(e) = self.interval() {
            errors.add(ValidationError::format("interval", e.to_string()));
        }

        let mut generic_names = HashSet::new();
        for (i, subscription) in self.subscriptions.iter().enumerate() {
            let path = format!("subscriptions[{i}]");
            if let Err(nested) = subscription.validate() {
                errors.merge_nested(&path, nested);
            }
            if let Subscription::Generic(generic) = subscription {
                if !generic_names.insert(generic.name.as_str()) {
                    errors.add(
                        ValidationError::format(
                            "name",
                            format!("duplicate generic subscription name '{}'", generic.name),
                        )
                        .nested(&format!("{path}.generic")),
                    );
                }
            }
        }

        errors.into_result()
    }
}

/// Freight creation policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum FreightCreationPolicy {
    /// Create Freight whenever discovery yields a new artifact set.
    #[default]
    Automatic,
    /// Never create Freight; discovery only.
    Manual,
}

/// Boolean expression gating automatic Freight creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FreightCreationCriteria {
    /// Expression source.
    pub expression: String,
}

/// Observed state of a Warehouse.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseStatus {
    /// Status conditions.
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,

    /// Generation of the spec the last discovery ran against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Refresh token handled by the last discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_handled_refresh: Option<String>,

    /// Results of the last successful discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_artifacts: Option<DiscoveredArtifacts>,

    /// Name of the last Freight created or found to exist.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "lastFreightID")]
    pub last_freight_id: Option<String>,
}

impl Warehouse {
    /// Returns the value of the refresh annotation, if set.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.annotations()
            .get(REFRESH_ANNOTATION)
            .map(String::as_str)
    }

    /// Returns the metadata generation, or 0 when unset.
    #[must_use]
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or_default()
    }

    /// Returns the namespace, or an empty string for unscoped objects.
    #[must_use]
    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use kube::core::ObjectMeta;
    use kube::Resource;

    use super::*;
    use crate::subscription::{GenericSubscription, GitSubscription, ImageSubscription};

    #[test]
    fn test_spec_defaults() {
        let spec: WarehouseSpec = serde_yaml::from_str(
            r"
subscriptions:
  - image:
      repoURL: ghcr.io/acme/api
",
        )
        .unwrap();
        assert_eq!(spec.interval, DEFAULT_INTERVAL);
        assert_eq!(spec.interval().unwrap(), Duration::from_secs(300));
        assert_eq!(spec.freight_creation_policy, FreightCreationPolicy::Automatic);
        assert!(spec.criteria_expression().is_none());
    }

    #[test]
    fn test_validate_requires_subscriptions() {
        let spec = WarehouseSpec::new(vec![]);
        let errors = spec.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.field == "subscriptions"));
    }

    #[test]
    fn test_validate_nests_subscription_errors() {
        let spec = WarehouseSpec::new(vec![
            Subscription::Git(GitSubscription::new("https://github.com/acme/app")),
            Subscription::Image(ImageSubscription::new("").with_discovery_limit(500)),
        ]);
        let errors = spec.validate().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"subscriptions[1].image.repoURL"));
        assert!(fields.contains(&"subscriptions[1].image.discoveryLimit"));
    }

    #[test]
    fn test_validate_rejects_bad_interval() {
        let mut spec = WarehouseSpec::new(vec![Subscription::Image(ImageSubscription::new(
            "nginx",
        ))]);
        spec.interval = "soon".to_string();
        assert!(!spec.is_valid());
    }

    #[test]
    fn test_validate_rejects_duplicate_generic_names() {
        let generic = GenericSubscription {
            kind: "http".to_string(),
            name: "manifest".to_string(),
            parameters: Default::default(),
            discovery_limit: 20,
        };
        let spec = WarehouseSpec::new(vec![
            Subscription::Generic(generic.clone()),
            Subscription::Generic(generic),
        ]);
        assert!(!spec.is_valid());
    }

    #[test]
    fn test_blank_criteria_is_ignored() {
        let mut spec = WarehouseSpec::new(vec![]);
        spec.freight_creation_criteria = Some(FreightCreationCriteria {
            expression: "   ".to_string(),
        });
        assert!(spec.criteria_expression().is_none());
    }

    #[test]
    fn test_refresh_token_and_generation() {
        let mut warehouse = Warehouse::new("app", WarehouseSpec::new(vec![]));
        assert_eq!(warehouse.generation(), 0);
        assert!(warehouse.refresh_token().is_none());

        warehouse.metadata = ObjectMeta {
            name: Some("app".to_string()),
            namespace: Some("prod".to_string()),
            generation: Some(4),
            annotations: Some(
                [(REFRESH_ANNOTATION.to_string(), "2026-01-01T00:00:00Z".to_string())]
                    .into_iter()
                    .collect(),
            ),
            ..ObjectMeta::default()
        };
        assert_eq!(warehouse.generation(), 4);
        assert_eq!(warehouse.refresh_token(), Some("2026-01-01T00:00:00Z"));
        assert_eq!(warehouse.namespace_or_default(), "prod");
        assert_eq!(Warehouse::group(&()), API_GROUP);
    }
}
