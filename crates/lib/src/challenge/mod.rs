//! Single-use challenges
//!
//! The [`ChallengeIssuer`] mints random nonces bound to one client and a
//! short validity window, and is the only place a nonce can be consumed.
//! Consumption happens under one lock, so two concurrent attempts on the
//! same nonce can never both succeed.
//!
//! Pending challenges are indexed by a BLAKE3 digest of the nonce; the raw
//! nonce is handed to the caller and not retained here.

pub mod errors;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::Mutex;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::clock::Clock;
use crate::crypto::{NONCE_SIZE, fingerprint, random_nonce};
use crate::identity::ClientId;
use crate::keystore::KeyStore;

pub use errors::ChallengeError;

/// Default validity window of a challenge.
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(90);

/// Default cap on outstanding challenges per client.
pub const DEFAULT_MAX_PENDING: usize = 16;

/// A 256-bit challenge nonce. Cleared from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Draw a fresh nonce from the OS CSPRNG.
    pub fn random() -> Self {
        Self(random_nonce())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChallengeError> {
        let array: [u8; NONCE_SIZE] =
            bytes
                .try_into()
                .map_err(|_| ChallengeError::MalformedNonce {
                    reason: format!("expected {NONCE_SIZE} bytes, got {}", bytes.len()),
                })?;
        Ok(Self(array))
    }

    pub fn from_hex(s: &str) -> Result<Self, ChallengeError> {
        let bytes = hex::decode(s).map_err(|e| ChallengeError::MalformedNonce {
            reason: e.to_string(),
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Loggable short identifier.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }

    fn digest(&self) -> [u8; 32] {
        *blake3::hash(&self.0).as_bytes()
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", self.fingerprint())
    }
}

impl Serialize for Nonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Nonce::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A challenge as handed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub nonce: Nonce,
    pub client_id: ClientId,
    pub issued_at: u64,
    pub expires_at: u64,
    pub consumed: bool,
}

impl Challenge {
    pub fn is_expired_at(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug)]
struct Pending {
    client_id: ClientId,
    issued_at: u64,
    expires_at: u64,
    consumed: bool,
}

impl Pending {
    fn is_open(&self, now: u64) -> bool {
        !self.consumed && now <= self.expires_at
    }
}

/// Issued challenges by nonce digest. Consumed and expired entries stay as
/// tombstones until purged; `open` lists each client's consumable ones.
#[derive(Debug, Default)]
struct PendingSet {
    by_digest: HashMap<[u8; 32], Pending>,
    open: HashMap<ClientId, Vec<[u8; 32]>>,
}

/// Mints and consumes challenges.
pub struct ChallengeIssuer {
    pending: Mutex<PendingSet>,
    keystore: Arc<KeyStore>,
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
    max_pending: usize,
}

impl ChallengeIssuer {
    pub fn new(keystore: Arc<KeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: Mutex::new(PendingSet::default()),
            keystore,
            clock,
            ttl_ms: DEFAULT_CHALLENGE_TTL.as_millis() as u64,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Cap on open challenges per client. Values below 1 are raised to 1.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Mint a challenge for an enrolled client.
    pub async fn issue(&self, client_id: &ClientId) -> Result<Challenge, ChallengeError> {
        if !self.keystore.contains(client_id).await {
            return Err(ChallengeError::UnknownClient {
                client_id: client_id.to_string(),
            });
        }

        let now = self.clock.now_millis();
        let mut pending = self.pending.lock().await;
        let PendingSet { by_digest, open } = &mut *pending;
        let open = open.entry(client_id.clone()).or_default();
        open.retain(|digest| by_digest.get(digest).is_some_and(|p| p.is_open(now)));
        if open.len() >= self.max_pending {
            tracing::warn!(client_id = %client_id, outstanding = open.len(), "Challenge limit reached");
            return Err(ChallengeError::TooManyPending {
                client_id: client_id.to_string(),
                limit: self.max_pending,
            });
        }

        let nonce = Nonce::random();
        let digest = nonce.digest();
        let expires_at = now.saturating_add(self.ttl_ms);
        by_digest.insert(
            digest,
            Pending {
                client_id: client_id.clone(),
                issued_at: now,
                expires_at,
                consumed: false,
            },
        );
        open.push(digest);
        tracing::debug!(client_id = %client_id, nonce = %nonce.fingerprint(), expires_at, "Issued challenge");

        Ok(Challenge {
            nonce,
            client_id: client_id.clone(),
            issued_at: now,
            expires_at,
            consumed: false,
        })
    }

    /// Use a challenge exactly once.
    ///
    /// Presenting a nonce under the wrong client burns it. A consumed nonce
    /// keeps reporting `AlreadyConsumed`, and an expired one `Expired`,
    /// until it is purged.
    pub async fn consume(
        &self,
        client_id: &ClientId,
        nonce: &Nonce,
    ) -> Result<Challenge, ChallengeError> {
        let fingerprint = nonce.fingerprint();
        let now = self.clock.now_millis();
        let mut pending = self.pending.lock().await;
        let entry = pending
            .by_digest
            .get_mut(&nonce.digest())
            .ok_or_else(|| ChallengeError::UnknownNonce {
                fingerprint: fingerprint.clone(),
            })?;

        if &entry.client_id != client_id {
            entry.consumed = true;
            return Err(ChallengeError::ClientMismatch {
                fingerprint,
                client_id: client_id.to_string(),
            });
        }
        if entry.consumed {
            return Err(ChallengeError::AlreadyConsumed { fingerprint });
        }
        if now > entry.expires_at {
            return Err(ChallengeError::Expired {
                fingerprint,
                expired_at: entry.expires_at,
            });
        }

        entry.consumed = true;
        Ok(Challenge {
            nonce: nonce.clone(),
            client_id: entry.client_id.clone(),
            issued_at: entry.issued_at,
            expires_at: entry.expires_at,
            consumed: true,
        })
    }

    /// Drop every challenge whose window has closed, consumed or not.
    /// Returns the number removed. A purged nonce no longer reports as
    /// replayed; presenting it again yields an unknown-nonce error.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut pending = self.pending.lock().await;
        let PendingSet { by_digest, open } = &mut *pending;
        let before = by_digest.len();
        by_digest.retain(|_, p| now <= p.expires_at);
        open.retain(|_, digests| {
            digests.retain(|digest| by_digest.contains_key(digest));
            !digests.is_empty()
        });
        let removed = before - by_digest.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = by_digest.len(), "Purged expired challenges");
        }
        removed
    }

    /// Drop all challenges of a client being de-enrolled.
    pub async fn forget_client(&self, client_id: &ClientId) -> usize {
        let mut pending = self.pending.lock().await;
        pending.open.remove(client_id);
        let before = pending.by_digest.len();
        pending.by_digest.retain(|_, p| &p.client_id != client_id);
        before - pending.by_digest.len()
    }

    /// Challenges that are neither consumed nor expired.
    pub async fn outstanding(&self) -> usize {
        let now = self.clock.now_millis();
        self.pending
            .lock()
            .await
            .by_digest
            .values()
            .filter(|p| p.is_open(now))
            .count()
    }
}
