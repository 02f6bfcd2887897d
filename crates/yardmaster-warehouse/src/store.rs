//! Persistence of Warehouses, their status and Freight.
//!
//! The reconciler only needs four primitives: read a Warehouse, create a
//! Freight (telling "already exists" apart from other failures), list Freight
//! and apply a status-only mutation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use parking_lot::RwLock;
use yardmaster_core::freight::WAREHOUSE_LABEL;
use yardmaster_core::{Freight, Warehouse, WarehouseStatus};

use crate::error::StoreError;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A status mutation applied by [`WarehouseStore::patch_status`].
pub type StatusMutator<'a> = &'a (dyn Fn(&mut WarehouseStatus) + Send + Sync);

const FIELD_MANAGER: &str = "yardmaster-warehouse";

/// Storage for Warehouses and Freight.
#[async_trait]
pub trait WarehouseStore: Send + Sync {
    /// Reads a Warehouse.
    async fn get_warehouse(&self, namespace: &str, name: &str) -> StoreResult<Warehouse>;

    /// Creates a Freight. Fails with [`StoreError::AlreadyExists`] when a
    /// Freight of the same name exists.
    async fn create_freight(&self, freight: &Freight) -> StoreResult<()>;

    /// Lists the Freight originating from a Warehouse.
    async fn list_freight(&self, namespace: &str, warehouse: &str) -> StoreResult<Vec<Freight>>;

    /// Applies `mutate` to the stored status of `warehouse` and returns the
    /// new status.
    async fn patch_status(
        &self,
        warehouse: &Warehouse,
        mutate: StatusMutator<'_>,
    ) -> StoreResult<WarehouseStatus>;
}

type Key = (String, String);

fn key_of(kind: &'static str, meta_namespace: Option<String>, name: Option<String>) -> StoreResult<Key> {
    let name = name.ok_or(StoreError::MissingName { kind })?;
    Ok((meta_namespace.unwrap_or_default(), name))
}

/// In-memory store used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    warehouses: RwLock<BTreeMap<Key, Warehouse>>,
    freight: RwLock<BTreeMap<Key, Freight>>,
    fail_creates: RwLock<Option<String>>,
    status_patches: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a Warehouse.
    ///
    /// # Errors
    ///
    /// Returns an error if the Warehouse has no name.
    pub fn put_warehouse(&self, warehouse: Warehouse) -> StoreResult<()> {
        let key = key_of("Warehouse", warehouse.namespace(), warehouse.metadata.name.clone())?;
        self.warehouses.write().insert(key, warehouse);
        Ok(())
    }

    /// Inserts a Freight directly, bypassing the existence check.
    ///
    /// # Errors
    ///
    /// Returns an error if the Freight has no name.
    pub fn put_freight(&self, freight: Freight) -> StoreResult<()> {
        let key = key_of("Freight", freight.namespace(), freight.metadata.name.clone())?;
        self.freight.write().insert(key, freight);
        Ok(())
    }

    /// Makes every subsequent Freight creation fail with `reason`.
    pub fn fail_freight_creation(&self, reason: impl Into<String>) {
        *self.fail_creates.write() = Some(reason.into());
    }

    /// Returns the stored status of a Warehouse.
    #[must_use]
    pub fn status(&self, namespace: &str, name: &str) -> Option<WarehouseStatus> {
        self.warehouses
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .and_then(|w| w.status.clone())
    }

    /// Returns the number of stored Freight.
    #[must_use]
    pub fn freight_count(&self) -> usize {
        self.freight.read().len()
    }

    /// Returns the number of status patches applied.
    #[must_use]
    pub fn status_patch_count(&self) -> usize {
        self.status_patches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WarehouseStore for MemoryStore {
    async fn get_warehouse(&self, namespace: &str, name: &str) -> StoreResult<Warehouse> {
        self.warehouses
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "Warehouse",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn create_freight(&self, freight: &Freight) -> StoreResult<()> {
        if let Some(reason) = self.fail_creates.read().clone() {
            return Err(StoreError::Unavailable { reason });
        }
        let key = key_of("Freight", freight.namespace(), freight.metadata.name.clone())?;
        let mut stored = self.freight.write();
        if stored.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: "Freight",
                namespace: key.0,
                name: key.1,
            });
        }
        stored.insert(key, freight.clone());
        Ok(())
    }

    async fn list_freight(&self, namespace: &str, warehouse: &str) -> StoreResult<Vec<Freight>> {
        Ok(self
            .freight
            .read()
            .iter()
            .filter(|((ns, _), f)| ns == namespace && f.spec.origin.name == warehouse)
            .map(|(_, f)| f.clone())
            .collect())
    }

    async fn patch_status(
        &self,
        warehouse: &Warehouse,
        mutate: StatusMutator<'_>,
    ) -> StoreResult<WarehouseStatus> {
        let key = key_of("Warehouse", warehouse.namespace(), warehouse.metadata.name.clone())?;
        let mut stored = self.warehouses.write();
        let entry = stored.get_mut(&key).ok_or_else(|| StoreError::NotFound {
            kind: "Warehouse",
            namespace: key.0.clone(),
            name: key.1.clone(),
        })?;
        let status = entry.status.get_or_insert_with(WarehouseStatus::default);
        mutate(status);
        self.status_patches.fetch_add(1, Ordering::SeqCst);
        Ok(status.clone())
    }
}

/// Store backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    /// Creates a store using the given client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    fn warehouses(&self, namespace: &str) -> Api<Warehouse> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn freight(&self, namespace: &str) -> Api<Freight> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == code)
}

#[async_trait]
impl WarehouseStore for KubeStore {
    async fn get_warehouse(&self, namespace: &str, name: &str) -> StoreResult<Warehouse> {
        self.warehouses(namespace).get(name).await.map_err(|e| {
            if is_status(&e, 404) {
                StoreError::NotFound {
                    kind: "Warehouse",
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                }
            } else {
                StoreError::Kube(e)
            }
        })
    }

    async fn create_freight(&self, freight: &Freight) -> StoreResult<()> {
        let (namespace, name) =
            key_of("Freight", freight.namespace(), freight.metadata.name.clone())?;
        match self
            .freight(&namespace)
            .create(&PostParams::default(), freight)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_status(&e, 409) => Err(StoreError::AlreadyExists {
                kind: "Freight",
                namespace,
                name,
            }),
            Err(e) => Err(StoreError::Kube(e)),
        }
    }

    async fn list_freight(&self, namespace: &str, warehouse: &str) -> StoreResult<Vec<Freight>> {
        let selector = format!("{WAREHOUSE_LABEL}={warehouse}");
        let list = self
            .freight(namespace)
            .list(&ListParams::default().labels(&selector))
            .await?;
        Ok(list.items)
    }

    async fn patch_status(
        &self,
        warehouse: &Warehouse,
        mutate: StatusMutator<'_>,
    ) -> StoreResult<WarehouseStatus> {
        let (namespace, name) =
            key_of("Warehouse", warehouse.namespace(), warehouse.metadata.name.clone())?;
        let api = self.warehouses(&namespace);
        let current = api.get_status(&name).await?;
        let mut status = current.status.unwrap_or_default();
        mutate(&mut status);

        let patch = serde_json::json!({ "status": serde_json::to_value(&status)? });
        api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(status)
    }
}
