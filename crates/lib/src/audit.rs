//! Append-only access audit trail.
//!
//! Every [`AuthDecision`] the gateway produces becomes one immutable
//! [`AccessEvent`]. The in-memory log is bounded; when full the oldest
//! event is dropped and counted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::identity::ClientId;
use crate::verifier::AuthDecision;

/// Default number of events retained.
pub const DEFAULT_AUDIT_CAPACITY: usize = 10_000;

/// One decided request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub event_id: Uuid,
    pub client_id: ClientId,
    pub endpoint: String,
    pub decision: AuthDecision,
    pub timestamp: u64,
    /// Fingerprint of the nonce presented, never the nonce itself.
    pub nonce_fingerprint: String,
}

impl AccessEvent {
    pub fn new(
        client_id: ClientId,
        endpoint: impl Into<String>,
        decision: AuthDecision,
        nonce_fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            client_id,
            endpoint: endpoint.into(),
            timestamp: decision.decided_at,
            decision,
            nonce_fingerprint: nonce_fingerprint.into(),
        }
    }
}

/// Aggregate numbers for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessStats {
    pub total_clients: usize,
    pub active_clients: usize,
    pub revoked_clients: usize,
    pub granted: u64,
    pub denied: u64,
    pub pending_challenges: usize,
    pub evicted_events: u64,
}

/// Bounded in-memory event log.
#[derive(Debug)]
pub struct AuditLog {
    events: RwLock<VecDeque<AccessEvent>>,
    capacity: usize,
    granted: AtomicU64,
    denied: AtomicU64,
    evicted: AtomicU64,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
            granted: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    pub async fn append(&self, event: AccessEvent) {
        if event.decision.granted {
            self.granted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied.fetch_add(1, Ordering::Relaxed);
        }
        let mut events = self.events.write().await;
        if events.len() == self.capacity {
            events.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event);
    }

    /// Up to `limit` most recent events, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<AccessEvent> {
        self.events
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Retained events of one client, oldest first.
    pub async fn for_client(&self, client_id: &ClientId) -> Vec<AccessEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| &e.client_id == client_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::Relaxed)
    }

    pub fn denied(&self) -> u64 {
        self.denied.load(Ordering::Relaxed)
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}
