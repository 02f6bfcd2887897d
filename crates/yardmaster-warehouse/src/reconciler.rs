//! Warehouse reconciliation.
//!
//! One reconcile cycle decides whether discovery is due, runs every
//! subscription through its subscriber, validates the results, evaluates the
//! Freight-creation criteria and creates the Freight. Every outcome is
//! recorded as status conditions:
//!
//! ```text
//!   validate spec ──invalid──▶ Stalled / InvalidSpec
//!        │
//!   discovery due? ──no──▶ requeue when due
//!        │
//!   pre-flight: Reconciling=True, Ready=False, Healthy=Unknown   (persist)
//!        │
//!   discover ──error──▶ DiscoveryFailed (error returned)
//!        │
//!   validate results ──empty──▶ Missing* / No*Discovered
//!        │
//!   criteria ──error──▶ FreightCreationCriteriaError
//!        │ ──false──▶ CriteriaNotMet
//!        │
//!   create Freight ──AlreadyExists──▶ FreightCreated=False (success)
//!        │         ──error──▶ FreightCreationFailed (error returned)
//!        │
//!   Ready=True, Healthy=True, record artifacts                    (persist)
//! ```
//!
//! Status is mutated locally and persisted at the pre-flight checkpoint and
//! at the end of the cycle. A failed status write on a failure path is logged
//! and does not replace the error being reported.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use yardmaster_core::warehouse::DEFAULT_INTERVAL;
use yardmaster_core::{
    parse_duration, Condition, ConditionStatus, ConditionType, DiscoveredArtifacts,
    FreightCreationPolicy, Subscription, Validate, Warehouse, WarehouseSpec, WarehouseStatus,
};
use yardmaster_registry::{SelectorOptions, TagFilter, VersionConstraint};

use crate::criteria::Criteria;
use crate::error::{Result, StoreError, WarehouseError};
use crate::freight::build_freight;
use crate::store::WarehouseStore;
use crate::subscriber::{DiscoveryResult, SubscriberDeps, SubscriberRegistry};

/// Condition reasons recorded by the reconciler.
pub mod reasons {
    /// The spec cannot be acted upon.
    pub const INVALID_SPEC: &str = "InvalidSpec";
    /// Discovery started.
    pub const DISCOVERY_IN_PROGRESS: &str = "DiscoveryInProgress";
    /// Discovery outcome is not known yet.
    pub const PENDING: &str = "Pending";
    /// A subscriber failed.
    pub const DISCOVERY_FAILED: &str = "DiscoveryFailed";
    /// A Git subscription found no commits (Ready).
    pub const MISSING_COMMITS: &str = "MissingCommits";
    /// A Git subscription found no commits (Healthy).
    pub const NO_COMMITS_DISCOVERED: &str = "NoCommitsDiscovered";
    /// An image subscription found no images (Ready).
    pub const MISSING_IMAGES: &str = "MissingImages";
    /// An image subscription found no images (Healthy).
    pub const NO_IMAGES_DISCOVERED: &str = "NoImagesDiscovered";
    /// A chart subscription found no versions (Ready).
    pub const MISSING_CHARTS: &str = "MissingCharts";
    /// A chart subscription found no versions (Healthy).
    pub const NO_CHARTS_DISCOVERED: &str = "NoChartsDiscovered";
    /// A generic subscription found no references (Ready).
    pub const MISSING_ARTIFACTS: &str = "MissingArtifacts";
    /// A generic subscription found no references (Healthy).
    pub const NO_ARTIFACT_REFERENCES_DISCOVERED: &str = "NoArtifactReferencesDiscovered";
    /// Discovery found nothing at all (Ready).
    pub const NO_ARTIFACTS: &str = "NoArtifacts";
    /// Discovery found nothing at all (Healthy).
    pub const NO_ARTIFACTS_DISCOVERED: &str = "NoArtifactsDiscovered";
    /// The criteria expression failed to compile or evaluate.
    pub const FREIGHT_CREATION_CRITERIA_ERROR: &str = "FreightCreationCriteriaError";
    /// The criteria expression evaluated to true, or none is configured.
    pub const CRITERIA_MET: &str = "CriteriaMet";
    /// The criteria expression evaluated to false.
    pub const CRITERIA_NOT_MET: &str = "CriteriaNotMet";
    /// A new Freight was created.
    pub const CREATED: &str = "Created";
    /// The Freight already existed.
    pub const ALREADY_EXISTS: &str = "AlreadyExists";
    /// The Freight could not be created.
    pub const FREIGHT_CREATION_FAILED: &str = "FreightCreationFailed";
    /// The cycle completed.
    pub const SUCCEEDED: &str = "Succeeded";
}

/// Result of one reconcile cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// When to reconcile again; `None` waits for a spec change.
    pub requeue_after: Option<Duration>,
    /// Whether discovery ran.
    pub discovered: bool,
}

fn interval_of(spec: &WarehouseSpec) -> Duration {
    spec.interval()
        .or_else(|_| parse_duration(DEFAULT_INTERVAL))
        .unwrap_or(Duration::from_secs(300))
}

/// Returns when discovery is next due after `discovered_at`, or `None` if
/// that lies beyond the representable range.
fn due_at(discovered_at: DateTime<Utc>, interval: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|interval| discovered_at.checked_add_signed(interval))
}

/// Returns true if the Warehouse needs a discovery cycle at `now`.
///
/// Discovery is due when nothing has been discovered yet, the discovery time
/// is unknown, the spec changed since the last discovery, the refresh
/// annotation changed, or the interval has elapsed.
#[must_use]
pub fn should_discover_artifacts(warehouse: &Warehouse, now: DateTime<Utc>) -> bool {
    let Some(status) = &warehouse.status else {
        return true;
    };
    let Some(discovered) = status
        .discovered_artifacts
        .as_ref()
        .filter(|d| !d.is_empty())
    else {
        return true;
    };
    let Some(discovered_at) = discovered.discovered_at else {
        return true;
    };
    if status
        .observed_generation
        .is_none_or(|observed| warehouse.generation() > observed)
    {
        return true;
    }
    if warehouse.refresh_token() != status.last_handled_refresh.as_deref() {
        return true;
    }
    due_at(discovered_at, interval_of(&warehouse.spec)).is_some_and(|due| now > due)
}

/// Returns how long until discovery is next due, zero if it is due now.
#[must_use]
pub fn next_discovery_in(warehouse: &Warehouse, now: DateTime<Utc>) -> Duration {
    if should_discover_artifacts(warehouse, now) {
        return Duration::ZERO;
    }
    let interval = interval_of(&warehouse.spec);
    warehouse
        .status
        .as_ref()
        .and_then(|s| s.discovered_artifacts.as_ref())
        .and_then(|d| d.discovered_at)
        .and_then(|at| due_at(at, interval))
        .and_then(|due| (due - now).to_std().ok())
        .unwrap_or(Duration::ZERO)
}

/// Checks what the schema cannot: patterns, platforms, version ranges and
/// that every subscription has a subscriber.
///
/// # Errors
///
/// Returns a description of the first problem found.
pub fn validate_spec(spec: &WarehouseSpec, subscribers: &SubscriberRegistry) -> std::result::Result<(), String> {
    spec.validate().map_err(|e| e.to_string())?;

    for (i, subscription) in spec.subscriptions.iter().enumerate() {
        let invalid = |e: &dyn std::fmt::Display| format!("subscriptions[{i}]: {e}");
        match subscription {
            Subscription::Image(image) => {
                let options = SelectorOptions::from_subscription(image).map_err(|e| invalid(&e))?;
                options.version_constraint().map_err(|e| invalid(&e))?;
            }
            Subscription::Git(git) => {
                TagFilter::new(&git.allow_tags, &git.ignore_tags).map_err(|e| invalid(&e))?;
                if let Some(constraint) = git.semver_constraint.as_deref().filter(|c| !c.trim().is_empty()) {
                    VersionConstraint::parse(constraint.trim()).map_err(|e| invalid(&e))?;
                }
            }
            Subscription::Chart(chart) => {
                if let Some(constraint) = chart.semver_constraint.as_deref().filter(|c| !c.trim().is_empty()) {
                    VersionConstraint::parse(constraint.trim()).map_err(|e| invalid(&e))?;
                }
            }
            Subscription::Generic(_) => {}
        }
        if !subscribers.supports(subscription) {
            return Err(invalid(&format!(
                "no subscriber registered for {}",
                subscription.describe()
            )));
        }
    }
    Ok(())
}

/// Returns the Ready and Healthy reasons for an empty result.
fn empty_result_reasons(result: &DiscoveryResult) -> (&'static str, &'static str, &'static str) {
    match result {
        DiscoveryResult::Git(_) => (
            reasons::MISSING_COMMITS,
            reasons::NO_COMMITS_DISCOVERED,
            "commits",
        ),
        DiscoveryResult::Image(_) => (
            reasons::MISSING_IMAGES,
            reasons::NO_IMAGES_DISCOVERED,
            "images",
        ),
        DiscoveryResult::Chart(_) => (
            reasons::MISSING_CHARTS,
            reasons::NO_CHARTS_DISCOVERED,
            "chart versions",
        ),
        DiscoveryResult::Generic(_) => (
            reasons::MISSING_ARTIFACTS,
            reasons::NO_ARTIFACT_REFERENCES_DISCOVERED,
            "artifact references",
        ),
    }
}

/// Local status under construction during one cycle.
struct StatusDraft {
    status: WarehouseStatus,
    generation: i64,
}

impl StatusDraft {
    fn set(&mut self, condition_type: ConditionType, status: ConditionStatus, reason: &str, message: impl Into<String>) {
        self.status.conditions.set(Condition::new(
            condition_type,
            status,
            reason,
            message,
            self.generation,
        ));
    }

    fn delete(&mut self, condition_type: ConditionType) {
        self.status.conditions.delete(condition_type);
    }

    /// Marks the Warehouse not ready and not healthy, ending the cycle.
    fn fail(&mut self, ready_reason: &str, healthy_reason: &str, message: &str) {
        self.set(ConditionType::Ready, ConditionStatus::False, ready_reason, message);
        self.set(ConditionType::Healthy, ConditionStatus::False, healthy_reason, message);
        self.delete(ConditionType::Reconciling);
    }
}

/// Reconciles Warehouses against a store.
pub struct Reconciler {
    store: Arc<dyn WarehouseStore>,
    subscribers: Arc<SubscriberRegistry>,
    deps: SubscriberDeps,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("subscribers", &self.subscribers)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a reconciler.
    #[must_use]
    pub fn new(
        store: Arc<dyn WarehouseStore>,
        subscribers: Arc<SubscriberRegistry>,
        deps: SubscriberDeps,
    ) -> Self {
        Self {
            store,
            subscribers,
            deps,
        }
    }

    /// Runs one reconcile cycle.
    ///
    /// Durable problems (an invalid spec, empty results, criteria errors) are
    /// recorded in conditions and return `Ok`; transient ones are recorded
    /// and returned as errors so the caller retries.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails, Freight creation fails for a
    /// reason other than the Freight already existing, or the final status
    /// cannot be written.
    pub async fn reconcile(
        &self,
        warehouse: &Warehouse,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome> {
        let namespace = warehouse.namespace_or_default();
        let name = warehouse.metadata.name.clone().unwrap_or_default();
        let now = Utc::now();
        let interval = interval_of(&warehouse.spec);
        let mut draft = StatusDraft {
            status: warehouse.status.clone().unwrap_or_default(),
            generation: warehouse.generation(),
        };

        if let Err(message) = validate_spec(&warehouse.spec, &self.subscribers) {
            tracing::warn!(%namespace, %name, error = %message, "Warehouse spec is invalid");
            draft.set(ConditionType::Stalled, ConditionStatus::True, reasons::INVALID_SPEC, &message);
            draft.fail(reasons::INVALID_SPEC, reasons::INVALID_SPEC, &message);
            self.persist_logged(warehouse, &draft.status).await;
            return Ok(ReconcileOutcome {
                requeue_after: None,
                discovered: false,
            });
        }
        let was_stalled = draft.status.conditions.get(ConditionType::Stalled).is_some();
        draft.delete(ConditionType::Stalled);

        if !should_discover_artifacts(warehouse, now) {
            if was_stalled {
                self.persist(warehouse, &draft.status).await?;
            }
            let requeue_after = next_discovery_in(warehouse, now);
            tracing::debug!(%namespace, %name, ?requeue_after, "Discovery not due");
            return Ok(ReconcileOutcome {
                requeue_after: Some(requeue_after),
                discovered: false,
            });
        }

        tracing::info!(
            %namespace,
            %name,
            subscriptions = warehouse.spec.subscriptions.len(),
            "Discovering artifacts"
        );
        draft.set(
            ConditionType::Reconciling,
            ConditionStatus::True,
            reasons::DISCOVERY_IN_PROGRESS,
            "Discovering artifacts",
        );
        draft.set(
            ConditionType::Ready,
            ConditionStatus::False,
            reasons::DISCOVERY_IN_PROGRESS,
            "Discovering artifacts",
        );
        draft.set(
            ConditionType::Healthy,
            ConditionStatus::Unknown,
            reasons::PENDING,
            "Discovery in progress",
        );
        draft.delete(ConditionType::FreightCreationCriteriaSatisfied);
        draft.delete(ConditionType::FreightCreated);
        self.persist_logged(warehouse, &draft.status).await;

        let results = match self.discover(warehouse, &namespace, cancel).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(%namespace, %name, error = %e, "Discovery failed");
                let message = format!("Unable to discover artifacts: {e}");
                draft.fail(reasons::DISCOVERY_FAILED, reasons::DISCOVERY_FAILED, &message);
                self.persist_logged(warehouse, &draft.status).await;
                return Err(e);
            }
        };

        let requeue = ReconcileOutcome {
            requeue_after: Some(interval),
            discovered: true,
        };

        let mut artifacts = DiscoveredArtifacts {
            discovered_at: Some(now),
            ..DiscoveredArtifacts::default()
        };
        for (subscription, result) in warehouse.spec.subscriptions.iter().zip(results) {
            if result.is_empty() {
                let (ready_reason, healthy_reason, noun) = empty_result_reasons(&result);
                let message = format!("No {noun} discovered for {}", subscription.describe());
                tracing::info!(%namespace, %name, reason = healthy_reason, "{message}");
                draft.fail(ready_reason, healthy_reason, &message);
                self.persist_logged(warehouse, &draft.status).await;
                return Ok(requeue);
            }
            result.append_to(&mut artifacts);
        }
        if artifacts.is_empty() {
            draft.fail(
                reasons::NO_ARTIFACTS,
                reasons::NO_ARTIFACTS_DISCOVERED,
                "No artifacts discovered",
            );
            self.persist_logged(warehouse, &draft.status).await;
            return Ok(requeue);
        }

        if warehouse.spec.freight_creation_policy == FreightCreationPolicy::Automatic {
            let satisfied = match warehouse.spec.criteria_expression() {
                None => true,
                Some(expression) => match Criteria::compile(expression)
                    .and_then(|criteria| criteria.evaluate(&artifacts))
                {
                    Ok(satisfied) => satisfied,
                    Err(e) => {
                        tracing::warn!(%namespace, %name, error = %e, "Criteria failed");
                        let message = e.to_string();
                        if e.is_compile() {
                            draft.set(
                                ConditionType::Stalled,
                                ConditionStatus::True,
                                reasons::FREIGHT_CREATION_CRITERIA_ERROR,
                                &message,
                            );
                        }
                        draft.fail(
                            reasons::FREIGHT_CREATION_CRITERIA_ERROR,
                            reasons::FREIGHT_CREATION_CRITERIA_ERROR,
                            &message,
                        );
                        self.persist_logged(warehouse, &draft.status).await;
                        return Ok(if e.is_compile() {
                            ReconcileOutcome {
                                requeue_after: None,
                                discovered: true,
                            }
                        } else {
                            requeue
                        });
                    }
                },
            };

            if satisfied {
                draft.set(
                    ConditionType::FreightCreationCriteriaSatisfied,
                    ConditionStatus::True,
                    reasons::CRITERIA_MET,
                    "Freight creation criteria satisfied",
                );
                if let Err(e) = self.create_freight(warehouse, &artifacts, &mut draft).await {
                    tracing::warn!(%namespace, %name, error = %e, "Freight creation failed");
                    let message = format!("Unable to create Freight: {e}");
                    draft.fail(
                        reasons::FREIGHT_CREATION_FAILED,
                        reasons::FREIGHT_CREATION_FAILED,
                        &message,
                    );
                    self.persist_logged(warehouse, &draft.status).await;
                    return Err(e);
                }
            } else {
                tracing::info!(%namespace, %name, "Freight creation criteria not met");
                draft.set(
                    ConditionType::FreightCreationCriteriaSatisfied,
                    ConditionStatus::False,
                    reasons::CRITERIA_NOT_MET,
                    "Freight creation criteria not met",
                );
            }
        }

        draft.set(
            ConditionType::Healthy,
            ConditionStatus::True,
            reasons::SUCCEEDED,
            "Artifacts discovered",
        );
        draft.set(
            ConditionType::Ready,
            ConditionStatus::True,
            reasons::SUCCEEDED,
            "Artifacts discovered",
        );
        draft.delete(ConditionType::Reconciling);
        draft.status.discovered_artifacts = Some(artifacts);
        draft.status.observed_generation = Some(draft.generation);
        draft.status.last_handled_refresh = warehouse.refresh_token().map(str::to_string);
        self.persist(warehouse, &draft.status).await?;

        tracing::info!(%namespace, %name, requeue_after = ?interval, "Reconciled Warehouse");
        Ok(requeue)
    }

    async fn discover(
        &self,
        warehouse: &Warehouse,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<DiscoveryResult>> {
        let mut results = Vec::with_capacity(warehouse.spec.subscriptions.len());
        for subscription in &warehouse.spec.subscriptions {
            if cancel.is_cancelled() {
                return Err(WarehouseError::Cancelled);
            }
            let subscriber = self
                .subscribers
                .new_subscriber(subscription, &self.deps, namespace)?;
            let result = subscriber.discover(cancel).await?;
            tracing::debug!(
                subscription = %subscription.describe(),
                empty = result.is_empty(),
                "Subscription discovered"
            );
            results.push(result);
        }
        Ok(results)
    }

    async fn create_freight(
        &self,
        warehouse: &Warehouse,
        artifacts: &DiscoveredArtifacts,
        draft: &mut StatusDraft,
    ) -> Result<()> {
        let freight = build_freight(warehouse, artifacts)?;
        let id = freight.metadata.name.clone().unwrap_or_default();

        match self.store.create_freight(&freight).await {
            Ok(()) => {
                tracing::info!(freight = %id, "Created Freight");
                draft.set(
                    ConditionType::FreightCreated,
                    ConditionStatus::True,
                    reasons::CREATED,
                    format!("Created Freight {id}"),
                );
            }
            Err(e) if e.is_already_exists() => {
                tracing::debug!(freight = %id, "Freight already exists");
                draft.set(
                    ConditionType::FreightCreated,
                    ConditionStatus::False,
                    reasons::ALREADY_EXISTS,
                    format!("Freight {id} already exists"),
                );
            }
            Err(e) => return Err(e.into()),
        }
        draft.status.last_freight_id = Some(id);
        Ok(())
    }

    async fn persist(&self, warehouse: &Warehouse, status: &WarehouseStatus) -> std::result::Result<(), StoreError> {
        self.store
            .patch_status(warehouse, &|s: &mut WarehouseStatus| *s = status.clone())
            .await
            .map(|_| ())
    }

    async fn persist_logged(&self, warehouse: &Warehouse, status: &WarehouseStatus) {
        if let Err(e) = self.persist(warehouse, status).await {
            tracing::warn!(
                namespace = %warehouse.namespace_or_default(),
                name = warehouse.metadata.name.as_deref().unwrap_or_default(),
                error = %e,
                "Failed to update Warehouse status"
            );
        }
    }
}
