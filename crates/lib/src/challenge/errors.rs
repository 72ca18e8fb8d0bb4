//! Challenge error types.
//!
//! Nonces are identified by their fingerprint only, never by value.

use thiserror::Error;

/// Errors raised while issuing or consuming challenges.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ChallengeError {
    /// A challenge was requested for a client that is not enrolled.
    #[error("Unknown client: {client_id}")]
    UnknownClient { client_id: String },

    /// The nonce was never issued, or has already been purged.
    #[error("Unknown nonce {fingerprint}")]
    UnknownNonce { fingerprint: String },

    /// The nonce was issued to a different client.
    #[error("Nonce {fingerprint} was not issued to {client_id}")]
    ClientMismatch {
        fingerprint: String,
        client_id: String,
    },

    /// The validity window has passed.
    #[error("Challenge {fingerprint} expired at {expired_at}")]
    Expired { fingerprint: String, expired_at: u64 },

    /// The challenge has already been used once.
    #[error("Challenge {fingerprint} already consumed")]
    AlreadyConsumed { fingerprint: String },

    /// The client has too many outstanding challenges.
    #[error("Client {client_id} has {limit} pending challenges")]
    TooManyPending { client_id: String, limit: usize },

    /// The nonce could not be decoded.
    #[error("Malformed nonce: {reason}")]
    MalformedNonce { reason: String },
}

impl ChallengeError {
    /// Check if this error is the expired-challenge outcome.
    pub fn is_expired(&self) -> bool {
        matches!(self, ChallengeError::Expired { .. })
    }

    /// Check if this error is a replay of a consumed challenge.
    pub fn is_already_consumed(&self) -> bool {
        matches!(self, ChallengeError::AlreadyConsumed { .. })
    }

    /// Check if this error indicates an unknown client.
    pub fn is_unknown_client(&self) -> bool {
        matches!(self, ChallengeError::UnknownClient { .. })
    }

    /// Check if the nonce itself was not recognized.
    pub fn is_unknown_nonce(&self) -> bool {
        matches!(
            self,
            ChallengeError::UnknownNonce { .. } | ChallengeError::MalformedNonce { .. }
        )
    }

    /// Check if the issuance limit was hit.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ChallengeError::TooManyPending { .. })
    }
}

impl From<ChallengeError> for crate::Error {
    fn from(err: ChallengeError) -> Self {
        crate::Error::Challenge(err)
    }
}
