//! Kubernetes controller loop for Warehouses.
//!
//! Watches Warehouse resources and runs a [`Reconciler`] cycle per change,
//! at most `max_concurrent_reconciles` at a time. Failures are retried with
//! per-object exponential backoff. Status writes made by a cycle trigger
//! watch events of their own; a per-object hold keeps those from starting
//! another discovery before the cycle's requeue time, unless the spec or
//! refresh annotation changed. Holds and failure counts are dropped once
//! the object is deleted, and timed holds are pruned after they lapse.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::controller::{Action, Config as RuntimeConfig, Controller, Error as ControllerError};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use yardmaster_core::Warehouse;

use crate::config::ControllerConfig;
use crate::error::WarehouseError;
use crate::reconciler::Reconciler;

#[derive(Debug, Clone)]
struct Hold {
    generation: i64,
    refresh: Option<String>,
    /// `None` holds until the spec or refresh annotation changes.
    until: Option<Instant>,
}

/// Shared state of the controller.
#[derive(Debug)]
pub struct Context {
    reconciler: Reconciler,
    config: ControllerConfig,
    shutdown: CancellationToken,
    failures: Mutex<HashMap<String, u32>>,
    holds: Mutex<HashMap<String, Hold>>,
}

impl Context {
    /// Creates a context. Cancelling `shutdown` cancels in-flight cycles.
    #[must_use]
    pub fn new(reconciler: Reconciler, config: ControllerConfig, shutdown: CancellationToken) -> Self {
        Self {
            reconciler,
            config,
            shutdown,
            failures: Mutex::new(HashMap::new()),
            holds: Mutex::new(HashMap::new()),
        }
    }

    /// Returns how long the object must still wait, if it is on hold.
    fn held_for(&self, key: &str, warehouse: &Warehouse) -> Option<Option<Duration>> {
        let holds = self.holds.lock();
        let hold = holds.get(key)?;
        if hold.generation != warehouse.generation()
            || hold.refresh.as_deref() != warehouse.refresh_token()
        {
            return None;
        }
        match hold.until {
            None => Some(None),
            Some(until) => {
                let remaining = until.saturating_duration_since(Instant::now());
                (!remaining.is_zero()).then_some(Some(remaining))
            }
        }
    }

    fn hold(&self, key: String, warehouse: &Warehouse, wait: Option<Duration>) {
        let now = Instant::now();
        let mut holds = self.holds.lock();
        holds.retain(|_, hold| hold.until.is_none_or(|until| until > now));
        holds.insert(
            key,
            Hold {
                generation: warehouse.generation(),
                refresh: warehouse.refresh_token().map(str::to_string),
                until: wait.map(|w| now + w),
            },
        );
    }

    fn record_failure(&self, key: &str) -> u32 {
        let mut failures = self.failures.lock();
        let count = failures.entry(key.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    fn clear_failures(&self, key: &str) {
        self.failures.lock().remove(key);
    }

    fn forget(&self, key: &str) {
        self.holds.lock().remove(key);
        self.clear_failures(key);
    }
}

fn object_key(warehouse: &Warehouse) -> String {
    format!("{}/{}", warehouse.namespace_or_default(), warehouse.name_any())
}

fn ref_key<K: kube::Resource>(object: &ObjectRef<K>) -> String {
    format!(
        "{}/{}",
        object.namespace.as_deref().unwrap_or("default"),
        object.name
    )
}

fn action_for(wait: Option<Duration>) -> Action {
    wait.map_or_else(Action::await_change, Action::requeue)
}

/// Reconciles one Warehouse.
///
/// # Errors
///
/// Returns the reconciler's error; [`error_policy`] schedules the retry.
pub async fn reconcile(warehouse: Arc<Warehouse>, ctx: Arc<Context>) -> Result<Action, WarehouseError> {
    let key = object_key(&warehouse);
    if warehouse.metadata.deletion_timestamp.is_some() {
        tracing::debug!(warehouse = %key, "Warehouse is being deleted");
        ctx.forget(&key);
        return Ok(Action::await_change());
    }
    if let Some(wait) = ctx.held_for(&key, &warehouse) {
        tracing::trace!(warehouse = %key, ?wait, "Warehouse on hold");
        return Ok(action_for(wait));
    }

    let cancel = ctx.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();
    let span = tracing::info_span!(
        "reconcile",
        namespace = %warehouse.namespace_or_default(),
        name = %warehouse.name_any()
    );

    let outcome = ctx
        .reconciler
        .reconcile(&warehouse, &cancel)
        .instrument(span)
        .await?;

    ctx.clear_failures(&key);
    ctx.hold(key, &warehouse, outcome.requeue_after);
    Ok(action_for(outcome.requeue_after))
}

/// Decides when to retry a failed reconcile.
///
/// Retryable errors back off exponentially per object; other errors wait the
/// maximum backoff.
pub fn error_policy(warehouse: Arc<Warehouse>, error: &WarehouseError, ctx: Arc<Context>) -> Action {
    let key = object_key(&warehouse);
    let failures = ctx.record_failure(&key);
    let delay = if error.is_retryable() {
        ctx.config.backoff(failures)
    } else {
        ctx.config.error_backoff_max
    };
    tracing::warn!(
        warehouse = %key,
        error = %error,
        failures,
        retry_in = ?delay,
        "Reconcile failed"
    );
    ctx.hold(key, &warehouse, Some(delay));
    Action::requeue(delay)
}

/// Runs the controller until `shutdown` is cancelled.
pub async fn run(client: Client, config: ControllerConfig, reconciler: Reconciler, shutdown: CancellationToken) {
    let api: Api<Warehouse> = match config.namespace.as_deref() {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    };
    let concurrency = config.max_concurrent_reconciles;
    tracing::info!(
        concurrency,
        namespace = config.namespace.as_deref().unwrap_or("<all>"),
        "Starting Warehouse controller"
    );

    let ctx = Arc::new(Context::new(reconciler, config, shutdown.clone()));
    let events = ctx.clone();
    let controller = Controller::new(api, watcher::Config::default())
        .with_config(RuntimeConfig::default().concurrency(concurrency))
        .run(reconcile, error_policy, ctx)
        .for_each(move |result| {
            let ctx = events.clone();
            async move {
                match result {
                    Ok((object, action)) => {
                        tracing::debug!(warehouse = %object.name, ?action, "Reconciled");
                    }
                    // Deleted objects surface here once they leave the watch cache.
                    Err(ControllerError::ObjectNotFound(object)) => {
                        let key = ref_key(&object);
                        tracing::debug!(warehouse = %key, "Warehouse deleted");
                        ctx.forget(&key);
                    }
                    Err(e) => tracing::debug!(error = %e, "Controller event"),
                }
            }
        });

    tokio::select! {
        () = controller => tracing::info!("Warehouse controller stream ended"),
        () = shutdown.cancelled() => tracing::info!("Warehouse controller shutting down"),
    }
}
