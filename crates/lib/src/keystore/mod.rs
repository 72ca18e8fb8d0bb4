//! Client key management
//!
//! The [`KeyStore`] generates, rotates and holds every client's signing key.
//! Private keys never cross its boundary in plaintext: verification and the
//! gateway's diagnostic signing happen inside, persistence sees only sealed
//! keys, and provisioning exports are sealed under a caller passphrase.
//!
//! # Security
//!
//! Plaintext keys live only in [`PrivateKey`] values owned by this module,
//! which zeroize on drop. Replacing or forgetting a key drops it.

pub mod errors;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::Result;
use crate::clock::Clock;
use crate::crypto::{PrivateKey, PublicKey, SealedKey, SealingKey};
use crate::identity::{Address, ClientId, ClientIdentity};
use crate::storage::{Persistence, RetiredKey, StoredKeys};

pub use errors::KeyStoreError;

/// The active key of one client.
struct KeyMaterial {
    private_key: PrivateKey,
    public_key: PublicKey,
    address: Address,
    created_at: u64,
    rotation_epoch: u64,
    retired: Option<RetiredKey>,
}

impl KeyMaterial {
    fn new(private_key: PrivateKey, created_at: u64, rotation_epoch: u64) -> Self {
        let public_key = private_key.public_key();
        let address = Address::from_public_key(&public_key);
        Self {
            private_key,
            public_key,
            address,
            created_at,
            rotation_epoch,
            retired: None,
        }
    }

    fn info(&self, client_id: &ClientId) -> KeyInfo {
        KeyInfo {
            client_id: client_id.clone(),
            public_key: self.public_key.clone(),
            address: self.address.clone(),
            created_at: self.created_at,
            rotation_epoch: self.rotation_epoch,
        }
    }

    fn to_stored(&self, client_id: &ClientId, sealing_key: &SealingKey) -> Result<StoredKeys> {
        Ok(StoredKeys {
            client_id: client_id.clone(),
            sealed: SealedKey::seal(&self.private_key, sealing_key)?,
            created_at: self.created_at,
            rotation_epoch: self.rotation_epoch,
            retired: self.retired.clone(),
        })
    }
}

/// Public view of a client's active key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub client_id: ClientId,
    pub public_key: PublicKey,
    pub address: Address,
    pub created_at: u64,
    pub rotation_epoch: u64,
}

type Slot = Arc<RwLock<KeyMaterial>>;

/// Owner of every client's key material.
///
/// Uses the same two-level locking as the access registry: the map lock is
/// held shared while a single client's slot is locked, so a rotation is
/// atomic with respect to verification of that client and invisible to
/// everyone else.
pub struct KeyStore {
    slots: RwLock<HashMap<ClientId, Slot>>,
    sealing_key: SealingKey,
    store: Arc<dyn Persistence>,
    clock: Arc<dyn Clock>,
    rotation_grace_ms: u64,
}

impl KeyStore {
    pub fn new(sealing_key: SealingKey, store: Arc<dyn Persistence>, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            sealing_key,
            store,
            clock,
            rotation_grace_ms: 0,
        }
    }

    /// Keep the previous public key valid for `grace` after a rotation.
    /// Zero (the default) means the old key stops verifying immediately.
    pub fn with_rotation_grace(mut self, grace: Duration) -> Self {
        self.rotation_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Create a key store and unseal every key held by `store`.
    pub async fn open(
        sealing_key: SealingKey,
        store: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let keystore = Self::new(sealing_key, store, clock);
        let mut slots = HashMap::new();
        for client_id in keystore.store.client_ids().await? {
            let Some(stored) = keystore.store.load_keys(&client_id).await? else {
                continue;
            };
            let private_key = stored.sealed.unseal(&keystore.sealing_key)?;
            let mut material =
                KeyMaterial::new(private_key, stored.created_at, stored.rotation_epoch);
            material.retired = stored.retired;
            slots.insert(client_id, Arc::new(RwLock::new(material)));
        }
        tracing::info!(count = slots.len(), "Loaded client keys");
        *keystore.slots.write().await = slots;
        Ok(keystore)
    }

    async fn slot(&self, client_id: &ClientId) -> Result<Slot> {
        self.slots
            .read()
            .await
            .get(client_id)
            .cloned()
            .ok_or_else(|| unknown(client_id))
    }

    /// Create the first key for a client.
    ///
    /// Fails with `DuplicateClient` if the client already has one; replacing
    /// a key is [`rotate`](Self::rotate).
    pub async fn generate(&self, client_id: &ClientId) -> Result<KeyInfo> {
        let mut slots = self.slots.write().await;
        if slots.contains_key(client_id) {
            return Err(KeyStoreError::DuplicateClient {
                client_id: client_id.to_string(),
            }
            .into());
        }

        let material = KeyMaterial::new(PrivateKey::generate(), self.clock.now_millis(), 0);
        let stored = material.to_stored(client_id, &self.sealing_key)?;
        self.store.save_keys(&stored).await?;

        let info = material.info(client_id);
        slots.insert(client_id.clone(), Arc::new(RwLock::new(material)));
        tracing::info!(client_id = %client_id, address = %info.address, "Generated client key");
        Ok(info)
    }

    /// Replace a client's key and bump its rotation epoch.
    ///
    /// Once this returns, verification uses only the new key (plus the old
    /// one for the configured grace window, if any).
    pub async fn rotate(&self, client_id: &ClientId) -> Result<KeyInfo> {
        let slots = self.slots.read().await;
        let slot = slots.get(client_id).ok_or_else(|| unknown(client_id))?;
        let mut current = slot.write().await;

        let now = self.clock.now_millis();
        let mut next = KeyMaterial::new(PrivateKey::generate(), now, current.rotation_epoch + 1);
        if self.rotation_grace_ms > 0 {
            next.retired = Some(RetiredKey {
                public_key: current.public_key.clone(),
                valid_until: now.saturating_add(self.rotation_grace_ms),
            });
        }
        let stored = next.to_stored(client_id, &self.sealing_key)?;
        self.store.save_keys(&stored).await?;

        let info = next.info(client_id);
        *current = next;
        tracing::info!(
            client_id = %client_id,
            epoch = info.rotation_epoch,
            address = %info.address,
            "Rotated client key"
        );
        Ok(info)
    }

    pub async fn public_key_of(&self, client_id: &ClientId) -> Result<PublicKey> {
        let slot = self.slot(client_id).await?;
        let material = slot.read().await;
        Ok(material.public_key.clone())
    }

    pub async fn identity(&self, client_id: &ClientId) -> Result<ClientIdentity> {
        let public_key = self.public_key_of(client_id).await?;
        Ok(ClientIdentity::new(client_id.clone(), public_key))
    }

    pub async fn info(&self, client_id: &ClientId) -> Result<KeyInfo> {
        let slot = self.slot(client_id).await?;
        let material = slot.read().await;
        Ok(material.info(client_id))
    }

    pub async fn contains(&self, client_id: &ClientId) -> bool {
        self.slots.read().await.contains_key(client_id)
    }

    /// Key info for every client, ordered by client id.
    pub async fn list(&self) -> Vec<KeyInfo> {
        let slots: Vec<(ClientId, Slot)> = self
            .slots
            .read()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();
        let mut out = Vec::with_capacity(slots.len());
        for (client_id, slot) in slots {
            out.push(slot.read().await.info(&client_id));
        }
        out.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        out
    }

    /// Find the client whose active key derives `address`.
    pub async fn client_by_address(&self, address: &Address) -> Option<ClientId> {
        let slots = self.slots.read().await;
        for (client_id, slot) in slots.iter() {
            if slot.read().await.address == *address {
                return Some(client_id.clone());
            }
        }
        None
    }

    /// Check `signature` over `message` against the client's current key.
    ///
    /// Reads the slot at call time, so a rotation that has committed is
    /// always observed.
    pub async fn verify(
        &self,
        client_id: &ClientId,
        message: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let slot = self.slot(client_id).await?;
        let material = slot.read().await;
        let active = material.public_key.verify(message, signature);
        if active.is_ok() {
            return Ok(());
        }
        if let Some(retired) = &material.retired
            && self.clock.now_millis() <= retired.valid_until
            && retired.public_key.verify(message, signature).is_ok()
        {
            tracing::debug!(client_id = %client_id, "Signature accepted by retired key in grace window");
            return Ok(());
        }
        active.map_err(Into::into)
    }

    /// Export the client's key sealed under `passphrase` for provisioning.
    pub async fn export_sealed(
        &self,
        client_id: &ClientId,
        passphrase: impl AsRef<str>,
    ) -> Result<SealedKey> {
        let slot = self.slot(client_id).await?;
        let material = slot.read().await;
        let sealed = SealedKey::seal_with_passphrase(&material.private_key, passphrase)?;
        tracing::info!(client_id = %client_id, epoch = material.rotation_epoch, "Exported sealed client key");
        Ok(sealed)
    }

    /// Sign a challenge nonce with the client's key without releasing it.
    pub(crate) async fn sign_challenge(&self, client_id: &ClientId, nonce: &[u8]) -> Result<Vec<u8>> {
        let slot = self.slot(client_id).await?;
        let material = slot.read().await;
        Ok(material.private_key.sign_challenge(nonce))
    }

    /// Run `op` while `client_id` is guaranteed to stay enrolled.
    ///
    /// Holds the slot map shared, so a concurrent removal waits for `op`.
    pub(crate) async fn with_enrolled<T>(
        &self,
        client_id: &ClientId,
        op: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let slots = self.slots.read().await;
        if !slots.contains_key(client_id) {
            return Err(unknown(client_id));
        }
        op.await
    }

    /// Take the slot map exclusively. No key operation of any client can be
    /// in flight while the returned guard is alive.
    pub(crate) async fn lock_exclusive(&self) -> KeyStoreLock<'_> {
        KeyStoreLock {
            slots: self.slots.write().await,
        }
    }
}

/// Exclusive hold on every key slot, used to remove a client atomically
/// with its persisted record.
pub(crate) struct KeyStoreLock<'a> {
    slots: RwLockWriteGuard<'a, HashMap<ClientId, Slot>>,
}

impl KeyStoreLock<'_> {
    pub(crate) fn contains(&self, client_id: &ClientId) -> bool {
        self.slots.contains_key(client_id)
    }

    /// Drop a client's key from memory. Callers remove the persisted record first.
    pub(crate) fn remove(&mut self, client_id: &ClientId) -> bool {
        self.slots.remove(client_id).is_some()
    }
}

fn unknown(client_id: &ClientId) -> crate::Error {
    KeyStoreError::UnknownClient {
        client_id: client_id.to_string(),
    }
    .into()
}
