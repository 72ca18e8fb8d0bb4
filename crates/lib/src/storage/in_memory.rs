//! In-memory persistence with optional JSON file mirroring.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::RwLock;

use super::{Persistence, StorageError, StoredKeys};
use crate::Result;
use crate::identity::ClientId;
use crate::registry::AccessRecord;

/// The current persistence file format version.
/// v0 indicates this is an unstable format subject to breaking changes.
const PERSISTENCE_VERSION: u8 = 0;

fn is_v0(v: &u8) -> bool {
    *v == 0
}

fn validate_persistence_version<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let version = u8::deserialize(deserializer)?;
    if version != PERSISTENCE_VERSION {
        return Err(serde::de::Error::custom(format!(
            "unsupported persistence version {version}; only version {PERSISTENCE_VERSION} is supported"
        )));
    }
    Ok(version)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(
        rename = "_v",
        default,
        skip_serializing_if = "is_v0",
        deserialize_with = "validate_persistence_version"
    )]
    version: u8,
    #[serde(default)]
    keys: BTreeMap<ClientId, StoredKeys>,
    #[serde(default)]
    access: BTreeMap<ClientId, AccessRecord>,
}

/// Map-backed store.
///
/// Without a file path this is purely volatile. With one, every mutation is
/// written to a temporary file and renamed over the target before it becomes
/// visible in memory, so a failed write leaves both the file and the maps at
/// their previous state.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    path: Option<PathBuf>,
}

impl InMemoryStore {
    /// Create a volatile store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a file-mirrored store, loading existing records if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|source| StorageError::DeserializationFailed { source })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(source) => return Err(StorageError::FileIo { source }.into()),
        };
        tracing::debug!(path = %path.display(), "Opened file-backed store");
        Ok(Self {
            state: RwLock::new(state),
            path: Some(path),
        })
    }

    /// Write a snapshot of the current records to `path`.
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let state = self.state.read().await;
        write_state(path.as_ref(), &state).await
    }

    /// The mirrored file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn commit(&self, mutate: impl FnOnce(&mut StoreState)) -> Result<()> {
        let mut state = self.state.write().await;
        match &self.path {
            None => {
                mutate(&mut state);
                Ok(())
            }
            Some(path) => {
                let mut next = state.clone();
                mutate(&mut next);
                write_state(path, &next).await?;
                *state = next;
                Ok(())
            }
        }
    }
}

async fn write_state(path: &Path, state: &StoreState) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(state)
        .map_err(|source| StorageError::SerializationFailed { source })?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|source| StorageError::FileIo { source })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| StorageError::FileIo { source })?;
    Ok(())
}

#[async_trait]
impl Persistence for InMemoryStore {
    fn kind(&self) -> &'static str {
        if self.path.is_some() { "file" } else { "memory" }
    }

    async fn load_keys(&self, client_id: &ClientId) -> Result<Option<StoredKeys>> {
        Ok(self.state.read().await.keys.get(client_id).cloned())
    }

    async fn save_keys(&self, record: &StoredKeys) -> Result<()> {
        let record = record.clone();
        self.commit(|state| {
            state.keys.insert(record.client_id.clone(), record);
        })
        .await
    }

    async fn load_access(&self, client_id: &ClientId) -> Result<Option<AccessRecord>> {
        Ok(self.state.read().await.access.get(client_id).cloned())
    }

    async fn save_access(&self, record: &AccessRecord) -> Result<()> {
        let record = record.clone();
        self.commit(|state| {
            state.access.insert(record.client_id.clone(), record);
        })
        .await
    }

    async fn delete(&self, client_id: &ClientId) -> Result<()> {
        self.commit(|state| {
            state.keys.remove(client_id);
            state.access.remove(client_id);
        })
        .await
    }

    async fn client_ids(&self) -> Result<Vec<ClientId>> {
        let state = self.state.read().await;
        let mut ids: Vec<ClientId> = state
            .keys
            .keys()
            .chain(state.access.keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
