//! Durable storage for key material and access records
//!
//! The engine keeps authoritative state in memory and writes through to a
//! [`Persistence`] implementation before committing any mutation. Records are
//! keyed by client id; key material is only ever stored sealed.
//!
//! ## Available Backends
//!
//! - [`InMemoryStore`]: maps in memory, optionally mirrored to a JSON file
//! - [`SqliteStore`] (feature: `sqlite`): embedded SQLite database

pub mod errors;
mod in_memory;
#[cfg(feature = "sqlite")]
mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::crypto::{PublicKey, SealedKey};
use crate::identity::ClientId;
use crate::registry::AccessRecord;

pub use errors::StorageError;
pub use in_memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Persisted form of a client's active key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredKeys {
    pub client_id: ClientId,
    /// Active private key, sealed under the store's sealing key
    pub sealed: SealedKey,
    pub created_at: u64,
    pub rotation_epoch: u64,
    /// Previous public key, present only while a rotation grace window is open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retired: Option<RetiredKey>,
}

/// A superseded public key that still verifies until `valid_until`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetiredKey {
    pub public_key: PublicKey,
    pub valid_until: u64,
}

/// Storage collaborator for [`KeyStore`](crate::keystore::KeyStore) and
/// [`AccessRegistry`](crate::registry::AccessRegistry).
///
/// Implementations must make each `save_*` call all-or-nothing: when it
/// returns an error, the previously stored record must still be readable.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Short name of the backend, reported by health checks.
    fn kind(&self) -> &'static str;

    async fn load_keys(&self, client_id: &ClientId) -> Result<Option<StoredKeys>>;

    async fn save_keys(&self, record: &StoredKeys) -> Result<()>;

    async fn load_access(&self, client_id: &ClientId) -> Result<Option<AccessRecord>>;

    async fn save_access(&self, record: &AccessRecord) -> Result<()>;

    /// Remove every record for a client. Removing an absent client succeeds.
    async fn delete(&self, client_id: &ClientId) -> Result<()>;

    /// All client ids with at least one stored record, sorted.
    async fn client_ids(&self) -> Result<Vec<ClientId>>;
}
