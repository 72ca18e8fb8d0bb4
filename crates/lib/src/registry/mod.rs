//! Access registry
//!
//! The single source of truth for authorization decisions: which clients are
//! active, and which endpoints each may reach.
//!
//! ## Concurrency
//!
//! Records live behind a per-client `RwLock`, nested inside a map lock.
//! Mutations hold the map lock shared and the record lock exclusive, persist
//! the new record, then swap it in. Readers therefore see either the old or
//! the new record, never a partial update, and clients never contend with
//! each other. Removing a client takes the map lock exclusively.

mod endpoint;
pub mod errors;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::Result;
use crate::clock::Clock;
use crate::identity::ClientId;
use crate::storage::Persistence;

pub use endpoint::EndpointPattern;
pub use errors::RegistryError;

/// Whether a client may currently be authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessStatus {
    Active,
    Revoked,
}

impl std::fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessStatus::Active => f.write_str("active"),
            AccessStatus::Revoked => f.write_str("revoked"),
        }
    }
}

/// Per-client access state. Only [`AccessRegistry`] mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub(crate) client_id: ClientId,
    status: AccessStatus,
    entitled_endpoints: BTreeSet<EndpointPattern>,
    #[serde(default)]
    last_access_at: Option<u64>,
    #[serde(default)]
    request_count: u64,
    #[serde(default)]
    status_changed_at: Option<u64>,
}

impl AccessRecord {
    /// A fresh active record with no recorded accesses.
    pub fn new(client_id: ClientId, entitled_endpoints: BTreeSet<EndpointPattern>) -> Self {
        Self {
            client_id,
            status: AccessStatus::Active,
            entitled_endpoints,
            last_access_at: None,
            request_count: 0,
            status_changed_at: None,
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn status(&self) -> AccessStatus {
        self.status
    }

    pub fn entitled_endpoints(&self) -> &BTreeSet<EndpointPattern> {
        &self.entitled_endpoints
    }

    pub fn last_access_at(&self) -> Option<u64> {
        self.last_access_at
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn status_changed_at(&self) -> Option<u64> {
        self.status_changed_at
    }

    /// Active and entitled to `endpoint`.
    pub fn permits(&self, endpoint: &str) -> bool {
        self.status == AccessStatus::Active
            && self.entitled_endpoints.iter().any(|p| p.matches(endpoint))
    }
}

type Slot = Arc<RwLock<AccessRecord>>;

/// Authoritative client → access status mapping.
pub struct AccessRegistry {
    records: RwLock<HashMap<ClientId, Slot>>,
    store: Arc<dyn Persistence>,
    clock: Arc<dyn Clock>,
}

impl AccessRegistry {
    /// Create an empty registry writing through to `store`.
    pub fn new(store: Arc<dyn Persistence>, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            store,
            clock,
        }
    }

    /// Create a registry and load every access record held by `store`.
    pub async fn open(store: Arc<dyn Persistence>, clock: Arc<dyn Clock>) -> Result<Self> {
        let registry = Self::new(store, clock);
        let mut records = HashMap::new();
        for client_id in registry.store.client_ids().await? {
            if let Some(record) = registry.store.load_access(&client_id).await? {
                records.insert(client_id, Arc::new(RwLock::new(record)));
            }
        }
        tracing::info!(count = records.len(), "Loaded access records");
        *registry.records.write().await = records;
        Ok(registry)
    }

    async fn slot(&self, client_id: &ClientId) -> Option<Slot> {
        self.records.read().await.get(client_id).cloned()
    }

    /// Activate a client and install its entitlements, replacing any
    /// previous set. Creates the record if absent. Idempotent.
    ///
    /// This is the only way a revoked client becomes active again.
    pub async fn grant(
        &self,
        client_id: &ClientId,
        endpoints: impl IntoIterator<Item = EndpointPattern>,
    ) -> Result<AccessRecord> {
        let endpoints: BTreeSet<EndpointPattern> = endpoints.into_iter().collect();

        loop {
            {
                let records = self.records.read().await;
                if let Some(slot) = records.get(client_id) {
                    let mut current = slot.write().await;
                    if current.status == AccessStatus::Active
                        && current.entitled_endpoints == endpoints
                    {
                        return Ok(current.clone());
                    }
                    let mut next = current.clone();
                    if next.status != AccessStatus::Active {
                        next.status = AccessStatus::Active;
                        next.status_changed_at = Some(self.clock.now_millis());
                    }
                    next.entitled_endpoints = endpoints;
                    self.store.save_access(&next).await?;
                    *current = next.clone();
                    tracing::info!(client_id = %client_id, endpoints = next.entitled_endpoints.len(), "Granted access");
                    return Ok(next);
                }
            }

            let mut records = self.records.write().await;
            if records.contains_key(client_id) {
                // Inserted concurrently; retry through the update path.
                continue;
            }
            let mut record = AccessRecord::new(client_id.clone(), endpoints);
            record.status_changed_at = Some(self.clock.now_millis());
            self.store.save_access(&record).await?;
            records.insert(client_id.clone(), Arc::new(RwLock::new(record.clone())));
            tracing::info!(client_id = %client_id, endpoints = record.entitled_endpoints.len(), "Granted access");
            return Ok(record);
        }
    }

    /// Mark a client revoked. Revoking a revoked client is a no-op success
    /// that leaves the record untouched.
    pub async fn revoke(&self, client_id: &ClientId) -> Result<()> {
        let records = self.records.read().await;
        let slot = records
            .get(client_id)
            .ok_or_else(|| RegistryError::UnknownClient {
                client_id: client_id.to_string(),
            })?;
        let mut current = slot.write().await;
        if current.status == AccessStatus::Revoked {
            return Ok(());
        }
        let mut next = current.clone();
        next.status = AccessStatus::Revoked;
        next.status_changed_at = Some(self.clock.now_millis());
        self.store.save_access(&next).await?;
        *current = next;
        tracing::info!(client_id = %client_id, "Revoked access");
        Ok(())
    }

    /// True iff the client is active and `endpoint` matches an entitlement.
    /// Unknown clients are never authorized.
    pub async fn is_authorized(&self, client_id: &ClientId, endpoint: &str) -> bool {
        match self.slot(client_id).await {
            Some(slot) => slot.read().await.permits(endpoint),
            None => false,
        }
    }

    /// Count one successful access and stamp `last_access_at`.
    pub async fn record_access(&self, client_id: &ClientId) -> Result<AccessRecord> {
        let records = self.records.read().await;
        let slot = records
            .get(client_id)
            .ok_or_else(|| RegistryError::UnknownClient {
                client_id: client_id.to_string(),
            })?;
        let mut current = slot.write().await;
        let mut next = current.clone();
        next.request_count += 1;
        next.last_access_at = Some(self.clock.now_millis());
        self.store.save_access(&next).await?;
        *current = next.clone();
        Ok(next)
    }

    /// Snapshot of one record.
    pub async fn get(&self, client_id: &ClientId) -> Option<AccessRecord> {
        match self.slot(client_id).await {
            Some(slot) => Some(slot.read().await.clone()),
            None => None,
        }
    }

    /// Snapshot of every record, ordered by client id.
    pub async fn list(&self) -> Vec<AccessRecord> {
        let slots: Vec<Slot> = self.records.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            out.push(slot.read().await.clone());
        }
        out.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        out
    }

    /// Take the record map exclusively, waiting out every in-flight grant,
    /// revoke and access count.
    pub(crate) async fn lock_exclusive(&self) -> RegistryLock<'_> {
        RegistryLock {
            records: self.records.write().await,
        }
    }
}

/// Exclusive hold on every access record.
pub(crate) struct RegistryLock<'a> {
    records: RwLockWriteGuard<'a, HashMap<ClientId, Slot>>,
}

impl RegistryLock<'_> {
    pub(crate) fn contains(&self, client_id: &ClientId) -> bool {
        self.records.contains_key(client_id)
    }

    /// Drop a client from memory. Callers remove the persisted record first.
    pub(crate) fn remove(&mut self, client_id: &ClientId) -> bool {
        self.records.remove(client_id).is_some()
    }
}
