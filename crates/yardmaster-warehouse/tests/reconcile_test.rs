//! End-to-end reconcile cycles against in-memory stores and sources.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::core::ObjectMeta;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use yardmaster_core::warehouse::REFRESH_ANNOTATION;
use yardmaster_core::{
    ArtifactReference, ChartSubscription, ConditionStatus, ConditionType, FreightCreationCriteria,
    FreightCreationPolicy, GenericSubscription, GitSubscription, ImageSubscription, Subscription,
    Warehouse, WarehouseSpec, WarehouseStatus,
};
use yardmaster_registry::{
    MemoryBackend, MemoryImage, RegistryAuth, RegistryBackend, RepositoryRef,
};
use yardmaster_warehouse::reconciler::reasons;
use yardmaster_warehouse::{
    Credentials, GenericSource, GitDiscoverer, HelmRepositories, ImageBackendFactory, MemoryStore,
    Reconciler, RemoteRef, Result, StaticCredentials, SubscriberDeps, SubscriberRegistry,
    WarehouseError, WarehouseStore,
};

const GIT_URL: &str = "https://github.com/acme/app";
const IMAGE_URL: &str = "ghcr.io/acme/api";

// ============================================================================
// Fakes
// ============================================================================

/// Git remote whose refs are set by the test.
#[derive(Debug, Default)]
struct FakeGit {
    refs: Mutex<Vec<RemoteRef>>,
    fail: Mutex<Option<String>>,
}

impl FakeGit {
    fn with_head(id: &str) -> Self {
        let git = Self::default();
        *git.refs.lock() = vec![
            RemoteRef::new("HEAD", id),
            RemoteRef::new("refs/heads/main", id),
        ];
        git
    }
}

#[async_trait]
impl GitDiscoverer for FakeGit {
    async fn list_refs(
        &self,
        repo_url: &str,
        _credentials: Option<&Credentials>,
        _insecure_skip_tls_verify: bool,
        _cancel: &CancellationToken,
    ) -> Result<Vec<RemoteRef>> {
        if let Some(reason) = self.fail.lock().clone() {
            return Err(WarehouseError::Git {
                repo_url: repo_url.to_string(),
                reason,
            });
        }
        Ok(self.refs.lock().clone())
    }
}

/// Image repositories served from memory; unknown repositories are empty.
#[derive(Debug, Default)]
struct FakeRegistries {
    repos: HashMap<String, Arc<MemoryBackend>>,
}

impl FakeRegistries {
    fn with_repo(mut self, repo_url: &str, backend: MemoryBackend) -> Self {
        let repo = RepositoryRef::parse(repo_url).unwrap();
        self.repos.insert(repo.to_string(), Arc::new(backend));
        self
    }
}

impl ImageBackendFactory for FakeRegistries {
    fn backend(
        &self,
        repo: &RepositoryRef,
        _auth: RegistryAuth,
        _insecure_skip_tls_verify: bool,
    ) -> yardmaster_registry::Result<Arc<dyn RegistryBackend>> {
        let backend = self.repos.get(&repo.to_string()).cloned().unwrap_or_default();
        Ok(backend)
    }
}

struct FixedSource(Vec<&'static str>);

#[async_trait]
impl GenericSource for FixedSource {
    async fn discover(
        &self,
        subscription: &GenericSubscription,
        _cancel: &CancellationToken,
    ) -> Result<Vec<ArtifactReference>> {
        Ok(self
            .0
            .iter()
            .map(|version| ArtifactReference {
                subscription_name: subscription.name.clone(),
                version: (*version).to_string(),
                metadata: BTreeMap::new(),
            })
            .collect())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    store: Arc<MemoryStore>,
    git: Arc<FakeGit>,
    reconciler: Reconciler,
}

impl Harness {
    fn new(git: FakeGit) -> Self {
        Self::with_registry(git, SubscriberRegistry::with_builtins().unwrap())
    }

    fn with_registry(git: FakeGit, registry: SubscriberRegistry) -> Self {
        let backends = Arc::new(
            FakeRegistries::default()
                .with_repo(
                    IMAGE_URL,
                    MemoryBackend::new()
                        .with_image("1.0.0", MemoryImage::new("sha256:aaa", None))
                        .with_image("1.1.0", MemoryImage::new("sha256:bbb", None)),
                )
                .with_repo(
                    "ghcr.io/acme/charts/api",
                    MemoryBackend::new().with_image("0.4.0", MemoryImage::new("sha256:c", None)),
                ),
        );

        let git = Arc::new(git);
        let deps = SubscriberDeps::new(
            Arc::new(StaticCredentials::new()),
            backends.clone(),
            git.clone(),
            Arc::new(HelmRepositories::new(backends)),
        )
        .unwrap();
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store.clone(), Arc::new(registry), deps);
        Self {
            store,
            git,
            reconciler,
        }
    }

    async fn reconcile(&self, warehouse: &Warehouse) -> Result<yardmaster_warehouse::ReconcileOutcome> {
        self.store.put_warehouse(warehouse.clone()).unwrap();
        self.reconciler
            .reconcile(warehouse, &CancellationToken::new())
            .await
    }

    fn status(&self) -> WarehouseStatus {
        self.store.status("team", "app").unwrap()
    }
}

fn warehouse(subscriptions: Vec<Subscription>) -> Warehouse {
    let mut wh = Warehouse::new("app", WarehouseSpec::new(subscriptions));
    wh.metadata = ObjectMeta {
        name: Some("app".to_string()),
        namespace: Some("team".to_string()),
        generation: Some(1),
        ..ObjectMeta::default()
    };
    wh
}

fn git_and_image() -> Warehouse {
    warehouse(vec![
        Subscription::Git(GitSubscription::new(GIT_URL)),
        Subscription::Image(ImageSubscription::new(IMAGE_URL)),
    ])
}

fn with_criteria(mut wh: Warehouse, expression: &str) -> Warehouse {
    wh.spec.freight_creation_criteria = Some(FreightCreationCriteria {
        expression: expression.to_string(),
    });
    wh
}

fn assert_condition(status: &WarehouseStatus, ty: ConditionType, expected: ConditionStatus, reason: &str) {
    let condition = status
        .conditions
        .get(ty)
        .unwrap_or_else(|| panic!("missing condition {ty:?}"));
    assert_eq!(condition.status, expected, "{ty:?}");
    assert_eq!(condition.reason, reason, "{ty:?}");
}

// ============================================================================
// Successful cycles
// ============================================================================

#[tokio::test]
async fn test_creates_freight_from_best_artifacts() {
    let h = Harness::new(FakeGit::with_head("abc123"));
    let wh = git_and_image();

    let outcome = h.reconcile(&wh).await.unwrap();
    assert!(outcome.discovered);
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(300)));

    let status = h.status();
    assert_condition(&status, ConditionType::Ready, ConditionStatus::True, reasons::SUCCEEDED);
    assert_condition(&status, ConditionType::Healthy, ConditionStatus::True, reasons::SUCCEEDED);
    assert_condition(
        &status,
        ConditionType::FreightCreationCriteriaSatisfied,
        ConditionStatus::True,
        reasons::CRITERIA_MET,
    );
    assert_condition(&status, ConditionType::FreightCreated, ConditionStatus::True, reasons::CREATED);
    assert!(status.conditions.get(ConditionType::Reconciling).is_none());
    assert_eq!(status.observed_generation, Some(1));

    let freight = h.store.list_freight("team", "app").await.unwrap();
    assert_eq!(freight.len(), 1);
    assert_eq!(freight[0].spec.commits[0].id, "abc123");
    assert_eq!(freight[0].spec.commits[0].branch.as_deref(), Some("main"));
    assert_eq!(freight[0].spec.images[0].tag, "1.1.0");
    assert_eq!(status.last_freight_id, freight[0].metadata.name);

    let artifacts = status.discovered_artifacts.unwrap();
    assert_eq!(artifacts.git.len(), 1);
    assert_eq!(artifacts.images[0].references.len(), 2);
}

#[tokio::test]
async fn test_existing_freight_is_not_a_failure() {
    let h = Harness::new(FakeGit::with_head("abc123"));
    let wh = git_and_image();
    h.reconcile(&wh).await.unwrap();
    let first_id = h.status().last_freight_id;

    // Force rediscovery of the same artifacts.
    let mut again = h.store.get_warehouse("team", "app").await.unwrap();
    again
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(REFRESH_ANNOTATION.to_string(), "1".to_string());
    let outcome = h.reconcile(&again).await.unwrap();
    assert!(outcome.discovered);

    let status = h.status();
    assert_condition(&status, ConditionType::Ready, ConditionStatus::True, reasons::SUCCEEDED);
    assert_condition(&status, ConditionType::Healthy, ConditionStatus::True, reasons::SUCCEEDED);
    assert_condition(
        &status,
        ConditionType::FreightCreationCriteriaSatisfied,
        ConditionStatus::True,
        reasons::CRITERIA_MET,
    );
    assert_condition(
        &status,
        ConditionType::FreightCreated,
        ConditionStatus::False,
        reasons::ALREADY_EXISTS,
    );
    assert_eq!(status.last_freight_id, first_id);
    assert_eq!(status.last_handled_refresh.as_deref(), Some("1"));
    assert_eq!(h.store.freight_count(), 1);
}

#[tokio::test]
async fn test_discovery_skipped_until_due() {
    let h = Harness::new(FakeGit::with_head("abc123"));
    h.reconcile(&git_and_image()).await.unwrap();
    let patches = h.store.status_patch_count();

    let current = h.store.get_warehouse("team", "app").await.unwrap();
    let outcome = h.reconcile(&current).await.unwrap();
    assert!(!outcome.discovered);
    assert!(outcome.requeue_after.unwrap() <= Duration::from_secs(300));
    assert_eq!(h.store.status_patch_count(), patches);
}

#[tokio::test]
async fn test_criteria_not_met() {
    let h = Harness::new(FakeGit::with_head("abc123"));
    let wh = with_criteria(
        git_and_image(),
        r#"imageFrom("ghcr.io/acme/api").Tag == "2.0.0""#,
    );

    h.reconcile(&wh).await.unwrap();
    let status = h.status();
    assert_condition(
        &status,
        ConditionType::FreightCreationCriteriaSatisfied,
        ConditionStatus::False,
        reasons::CRITERIA_NOT_MET,
    );
    assert_condition(&status, ConditionType::Ready, ConditionStatus::True, reasons::SUCCEEDED);
    assert!(status.conditions.get(ConditionType::FreightCreated).is_none());
    assert_eq!(h.store.freight_count(), 0);
}

#[tokio::test]
async fn test_criteria_met_creates_freight() {
    let h = Harness::new(FakeGit::with_head("abc123"));
    let wh = with_criteria(
        git_and_image(),
        r#"commitFrom("https://github.com/acme/app").Branch == "main" && imageFrom("ghcr.io/acme/api").Tag == "1.1.0""#,
    );

    h.reconcile(&wh).await.unwrap();
    assert_condition(&h.status(), ConditionType::FreightCreated, ConditionStatus::True, reasons::CREATED);
    assert_eq!(h.store.freight_count(), 1);
}

#[tokio::test]
async fn test_manual_policy_discovers_only() {
    let h = Harness::new(FakeGit::with_head("abc123"));
    let mut wh = git_and_image();
    wh.spec.freight_creation_policy = FreightCreationPolicy::Manual;

    h.reconcile(&wh).await.unwrap();
    let status = h.status();
    assert_condition(&status, ConditionType::Ready, ConditionStatus::True, reasons::SUCCEEDED);
    assert!(status.conditions.get(ConditionType::FreightCreationCriteriaSatisfied).is_none());
    assert!(status.discovered_artifacts.is_some());
    assert_eq!(h.store.freight_count(), 0);
}

#[tokio::test]
async fn test_charts_and_generic_sources() {
    let mut registry = SubscriberRegistry::with_builtins().unwrap();
    registry
        .register_generic("bucket", Arc::new(FixedSource(vec!["v9", "v8"])))
        .unwrap();
    let h = Harness::with_registry(FakeGit::default(), registry);

    let wh = warehouse(vec![
        Subscription::Chart(ChartSubscription {
            repo_url: "oci://ghcr.io/acme/charts".to_string(),
            name: Some("api".to_string()),
            semver_constraint: None,
            discovery_limit: 20,
        }),
        Subscription::Generic(GenericSubscription {
            kind: "bucket".to_string(),
            name: "bundle".to_string(),
            parameters: BTreeMap::new(),
            discovery_limit: 20,
        }),
    ]);

    h.reconcile(&wh).await.unwrap();
    let freight = h.store.list_freight("team", "app").await.unwrap();
    assert_eq!(freight.len(), 1);
    assert_eq!(freight[0].spec.charts[0].version, "0.4.0");
    assert_eq!(freight[0].spec.artifacts[0].version, "v9");
}

// ============================================================================
// Failure cycles
// ============================================================================

#[tokio::test]
async fn test_no_commits_discovered() {
    let h = Harness::new(FakeGit::default());
    let wh = git_and_image();

    let outcome = h.reconcile(&wh).await.unwrap();
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(300)));

    let status = h.status();
    assert_condition(&status, ConditionType::Ready, ConditionStatus::False, reasons::MISSING_COMMITS);
    assert_condition(
        &status,
        ConditionType::Healthy,
        ConditionStatus::False,
        reasons::NO_COMMITS_DISCOVERED,
    );
    assert!(status.conditions.get(ConditionType::Reconciling).is_none());
    assert!(status.discovered_artifacts.is_none());
    assert_eq!(h.store.freight_count(), 0);
}

#[tokio::test]
async fn test_invalid_spec_stalls() {
    let h = Harness::new(FakeGit::with_head("abc123"));
    let mut wh = git_and_image();
    wh.spec.interval = "every so often".to_string();

    let outcome = h.reconcile(&wh).await.unwrap();
    assert_eq!(outcome.requeue_after, None);
    assert!(!outcome.discovered);

    let status = h.status();
    assert_condition(&status, ConditionType::Stalled, ConditionStatus::True, reasons::INVALID_SPEC);
    assert_condition(&status, ConditionType::Ready, ConditionStatus::False, reasons::INVALID_SPEC);
}

#[tokio::test]
async fn test_criteria_compile_error_stalls() {
    let h = Harness::new(FakeGit::with_head("abc123"));
    let wh = with_criteria(git_and_image(), r#"imageFrom("ghcr.io/acme/api").Tag =="#);

    let outcome = h.reconcile(&wh).await.unwrap();
    assert_eq!(outcome.requeue_after, None);

    let status = h.status();
    assert_condition(
        &status,
        ConditionType::Stalled,
        ConditionStatus::True,
        reasons::FREIGHT_CREATION_CRITERIA_ERROR,
    );
    assert_condition(
        &status,
        ConditionType::Healthy,
        ConditionStatus::False,
        reasons::FREIGHT_CREATION_CRITERIA_ERROR,
    );
    assert_eq!(h.store.freight_count(), 0);
}

#[tokio::test]
async fn test_deeply_nested_criteria_stalls() {
    let h = Harness::new(FakeGit::with_head("abc123"));
    let nested = format!("{}true{}", "(".repeat(2_000), ")".repeat(2_000));
    let wh = with_criteria(git_and_image(), &nested);

    let outcome = h.reconcile(&wh).await.unwrap();
    assert_eq!(outcome.requeue_after, None);
    assert_condition(
        &h.status(),
        ConditionType::Stalled,
        ConditionStatus::True,
        reasons::FREIGHT_CREATION_CRITERIA_ERROR,
    );
    assert_eq!(h.store.freight_count(), 0);
}

#[tokio::test]
async fn test_criteria_evaluation_error_retries_on_interval() {
    let h = Harness::new(FakeGit::with_head("abc123"));
    let wh = with_criteria(git_and_image(), r#"true == "true""#);

    let outcome = h.reconcile(&wh).await.unwrap();
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(300)));

    let status = h.status();
    assert!(status.conditions.get(ConditionType::Stalled).is_none());
    assert_condition(
        &status,
        ConditionType::Ready,
        ConditionStatus::False,
        reasons::FREIGHT_CREATION_CRITERIA_ERROR,
    );
}

#[tokio::test]
async fn test_discovery_failure_is_returned() {
    let h = Harness::new(FakeGit::with_head("abc123"));
    *h.git.fail.lock() = Some("connection reset".to_string());

    let err = h.reconcile(&git_and_image()).await.unwrap_err();
    assert!(matches!(err, WarehouseError::Git { .. }));
    assert!(err.is_retryable());

    let status = h.status();
    assert_condition(&status, ConditionType::Ready, ConditionStatus::False, reasons::DISCOVERY_FAILED);
    assert_condition(
        &status,
        ConditionType::Healthy,
        ConditionStatus::False,
        reasons::DISCOVERY_FAILED,
    );
}

#[tokio::test]
async fn test_freight_creation_failure_is_returned() {
    let h = Harness::new(FakeGit::with_head("abc123"));
    h.store.fail_freight_creation("etcd unavailable");

    let err = h.reconcile(&git_and_image()).await.unwrap_err();
    assert!(matches!(err, WarehouseError::Store(_)));

    let status = h.status();
    assert_condition(
        &status,
        ConditionType::Ready,
        ConditionStatus::False,
        reasons::FREIGHT_CREATION_FAILED,
    );
    assert!(status.discovered_artifacts.is_none());
}

#[tokio::test]
async fn test_recovers_after_stall() {
    let h = Harness::new(FakeGit::with_head("abc123"));
    let mut wh = git_and_image();
    wh.spec.interval = "bogus".to_string();
    h.reconcile(&wh).await.unwrap();

    let mut fixed = h.store.get_warehouse("team", "app").await.unwrap();
    fixed.spec.interval = "10m".to_string();
    fixed.metadata.generation = Some(2);
    let outcome = h.reconcile(&fixed).await.unwrap();
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(600)));

    let status = h.status();
    assert!(status.conditions.get(ConditionType::Stalled).is_none());
    assert_condition(&status, ConditionType::Ready, ConditionStatus::True, reasons::SUCCEEDED);
    assert_eq!(status.observed_generation, Some(2));
}
