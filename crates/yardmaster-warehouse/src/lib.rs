//! Yardmaster Warehouse
//!
//! This crate turns a Warehouse's subscriptions into Freight: it discovers
//! what each artifact source currently offers, decides whether a new Freight
//! should be created and records every outcome in the Warehouse's status.
//!
//! # Overview
//!
//! - **Subscribers**: Git, image, chart and pluggable generic sources, chosen
//!   per subscription by a predicate registry
//! - **Criteria**: a small boolean language gating automatic Freight creation
//! - **Reconciler**: the discovery / validation / creation state machine
//! - **Stores**: in-memory and Kubernetes persistence of Warehouses and Freight
//! - **Controller**: the Kubernetes watch loop with bounded concurrency and
//!   per-object error backoff
//!
//! # Architecture
//!
//! ```text
//!   Warehouse ──▶ Reconciler ──▶ SubscriberRegistry ──▶ Git / Image / Chart / Generic
//!                     │                                        │
//!                     │                      RepositoryClient ◀┘ (shared cache,
//!                     ▼                                           pool, limiters)
//!                 Criteria ──▶ build_freight ──▶ WarehouseStore
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tokio_util::sync::CancellationToken;
//! use yardmaster_warehouse::{
//!     GitCli, HelmRepositories, MemoryStore, OciBackendFactory, Reconciler,
//!     StaticCredentials, SubscriberDeps, SubscriberRegistry,
//! };
//!
//! # async fn example(warehouse: yardmaster_core::Warehouse) -> yardmaster_warehouse::Result<()> {
//! let oci = Arc::new(OciBackendFactory::default());
//! let deps = SubscriberDeps::new(
//!     Arc::new(StaticCredentials::new()),
//!     oci.clone(),
//!     Arc::new(GitCli::default()),
//!     Arc::new(HelmRepositories::new(oci)),
//! )?;
//! let reconciler = Reconciler::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(SubscriberRegistry::with_builtins()?),
//!     deps,
//! );
//!
//! let outcome = reconciler.reconcile(&warehouse, &CancellationToken::new()).await?;
//! println!("next cycle in {:?}", outcome.requeue_after);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::significant_drop_tightening)]

pub mod config;
pub mod controller;
pub mod credentials;
pub mod criteria;
pub mod error;
pub mod freight;
pub mod reconciler;
pub mod store;
pub mod subscriber;


// Re-export main types at crate root
pub use config::{ControllerConfig, ControllerConfigBuilder, DEFAULT_MAX_CONCURRENT_RECONCILES};
pub use controller::Context;
pub use credentials::{
    CredentialType, Credentials, CredentialsDatabase, KubernetesCredentials, StaticCredentials,
    CREDENTIAL_TYPE_LABEL,
};
pub use criteria::{Criteria, CriteriaError};
pub use error::{Result, StoreError, WarehouseError};
pub use freight::build_freight;
pub use reconciler::{
    next_discovery_in, should_discover_artifacts, validate_spec, ReconcileOutcome, Reconciler,
};
pub use store::{KubeStore, MemoryStore, StatusMutator, StoreResult, WarehouseStore};
pub use subscriber::{
    ChartDiscoverer, DiscoveryResult, GenericSource, GitCli, GitDiscoverer, HelmRepositories,
    ImageBackendFactory, OciBackendFactory, RateLimiters, RemoteRef, Subscriber,
    SubscriberDeps, SubscriberRegistry,
};
