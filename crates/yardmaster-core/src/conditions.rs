//! Status conditions.
//!
//! A Warehouse exposes its state as a set of independently timestamped
//! conditions keyed by type, rather than a single phase. Dashboards and CLIs
//! read these; every failure is explained by a condition reason and message.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition types set on a Warehouse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionType {
    /// A reconcile cycle is in progress.
    Reconciling,
    /// The Warehouse has a healthy, current snapshot.
    Ready,
    /// The last discovery succeeded and produced valid results.
    Healthy,
    /// Progress requires a spec change.
    Stalled,
    /// Result of evaluating the Freight-creation criteria.
    FreightCreationCriteriaSatisfied,
    /// Result of the last Freight creation attempt.
    FreightCreated,
}

impl ConditionType {
    /// Returns the wire name of the condition type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reconciling => "Reconciling",
            Self::Ready => "Ready",
            Self::Healthy => "Healthy",
            Self::Stalled => "Stalled",
            Self::FreightCreationCriteriaSatisfied => "FreightCreationCriteriaSatisfied",
            Self::FreightCreated => "FreightCreated",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state condition status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// Not yet determined.
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

/// A single status condition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type.
    #[serde(rename = "type")]
    pub condition_type: ConditionType,

    /// Condition status.
    pub status: ConditionStatus,

    /// Machine-readable reason in `CamelCase`.
    pub reason: String,

    /// Human-readable detail.
    #[serde(default)]
    pub message: String,

    /// Generation of the Warehouse the condition was computed for.
    #[serde(default)]
    pub observed_generation: i64,

    /// Last time the status changed.
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Creates a condition stamped with the current time.
    pub fn new(
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        observed_generation: i64,
    ) -> Self {
        Self {
            condition_type,
            status,
            reason: reason.into(),
            message: message.into(),
            observed_generation,
            last_transition_time: Utc::now(),
        }
    }
}

/// Set of conditions keyed by type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Inserts or replaces the condition of the same type.
    ///
    /// The previous transition time is kept when the status is unchanged.
    pub fn set(&mut self, mut condition: Condition) {
        match self
            .0
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
            }
            None => self.0.push(condition),
        }
    }

    /// Removes the condition of the given type, if present.
    pub fn delete(&mut self, condition_type: ConditionType) {
        self.0.retain(|c| c.condition_type != condition_type);
    }

    /// Returns the condition of the given type.
    #[must_use]
    pub fn get(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.condition_type == condition_type)
    }

    /// Returns true if the condition exists with status `True`.
    #[must_use]
    pub fn is_true(&self, condition_type: ConditionType) -> bool {
        self.get(condition_type)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Iterates over all conditions.
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    /// Returns the number of conditions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no conditions are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn ready(status: ConditionStatus, reason: &str) -> Condition {
        Condition::new(ConditionType::Ready, status, reason, "", 1)
    }

    #[test]
    fn test_set_replaces_same_type() {
        let mut conditions = Conditions::new();
        conditions.set(ready(ConditionStatus::False, "Pending"));
        conditions.set(ready(ConditionStatus::True, "Succeeded"));

        assert_eq!(conditions.len(), 1);
        let ready = conditions.get(ConditionType::Ready).unwrap();
        assert_eq!(ready.reason, "Succeeded");
        assert!(conditions.is_true(ConditionType::Ready));
    }

    #[test]
    fn test_transition_time_kept_when_status_unchanged() {
        let mut conditions = Conditions::new();
        let mut first = ready(ConditionStatus::True, "Succeeded");
        first.last_transition_time -= Duration::hours(1);
        let original = first.last_transition_time;
        conditions.set(first);

        conditions.set(ready(ConditionStatus::True, "StillSucceeded"));
        let current = conditions.get(ConditionType::Ready).unwrap();
        assert_eq!(current.last_transition_time, original);
        assert_eq!(current.reason, "StillSucceeded");

        conditions.set(ready(ConditionStatus::False, "Failed"));
        let current = conditions.get(ConditionType::Ready).unwrap();
        assert!(current.last_transition_time > original);
    }

    #[test]
    fn test_delete() {
        let mut conditions = Conditions::new();
        conditions.set(ready(ConditionStatus::True, "Succeeded"));
        conditions.delete(ConditionType::Ready);
        conditions.delete(ConditionType::Stalled);
        assert!(conditions.is_empty());
        assert!(!conditions.is_true(ConditionType::Ready));
    }

    #[test]
    fn test_serialized_shape() {
        let mut conditions = Conditions::new();
        conditions.set(Condition::new(
            ConditionType::Healthy,
            ConditionStatus::Unknown,
            "Discovering",
            "discovering artifacts",
            3,
        ));
        let json = serde_json::to_value(&conditions).unwrap();
        assert_eq!(json[0]["type"], "Healthy");
        assert_eq!(json[0]["status"], "Unknown");
        assert_eq!(json[0]["observedGeneration"], 3);
    }
}
