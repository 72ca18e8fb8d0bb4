//! Signed-request verification.
//!
//! [`AuthVerifier::verify`] runs three checks in a fixed order and stops at
//! the first failure:
//!
//! 1. consume the challenge bound to the claimed client,
//! 2. verify the signature with the client's current public key,
//! 3. ask the access registry whether the client may reach the endpoint.
//!
//! Replays are rejected before any signature work, and a forged signature
//! is rejected before the registry is consulted, so it never learns whether
//! the claimed client has access. Step 3 reads the registry at the moment it
//! runs; a revocation that lands after step 2 still denies.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::challenge::{ChallengeIssuer, Nonce};
use crate::clock::Clock;
use crate::crypto::challenge_message;
use crate::identity::ClientId;
use crate::keystore::KeyStore;
use crate::registry::AccessRegistry;

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    InvalidChallenge,
    SignatureMismatch,
    AccessDenied,
    /// Verification passed but the access could not be recorded.
    StorageFailure,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DenyReason::InvalidChallenge => "invalid challenge",
            DenyReason::SignatureMismatch => "signature mismatch",
            DenyReason::AccessDenied => "access denied",
            DenyReason::StorageFailure => "storage failure",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of one verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthDecision {
    pub granted: bool,
    pub reason: Option<DenyReason>,
    pub decided_at: u64,
}

impl AuthDecision {
    pub fn grant(decided_at: u64) -> Self {
        Self {
            granted: true,
            reason: None,
            decided_at,
        }
    }

    pub fn deny(reason: DenyReason, decided_at: u64) -> Self {
        Self {
            granted: false,
            reason: Some(reason),
            decided_at,
        }
    }

    pub fn is_granted(&self) -> bool {
        self.granted
    }

    /// The denial reason, if denied.
    pub fn denied(&self) -> Option<DenyReason> {
        self.reason
    }
}

/// What a client presents to reach a protected endpoint.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub client_id: ClientId,
    pub nonce: Nonce,
    pub signature: Vec<u8>,
    pub endpoint: String,
}

impl SignedRequest {
    pub fn new(
        client_id: ClientId,
        nonce: Nonce,
        signature: impl Into<Vec<u8>>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client_id,
            nonce,
            signature: signature.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// Produces an [`AuthDecision`] for a [`SignedRequest`].
pub struct AuthVerifier {
    issuer: Arc<ChallengeIssuer>,
    keystore: Arc<KeyStore>,
    registry: Arc<AccessRegistry>,
    clock: Arc<dyn Clock>,
}

impl AuthVerifier {
    pub fn new(
        issuer: Arc<ChallengeIssuer>,
        keystore: Arc<KeyStore>,
        registry: Arc<AccessRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            issuer,
            keystore,
            registry,
            clock,
        }
    }

    /// Verify a request. Never retries a failed step.
    pub async fn verify(&self, request: &SignedRequest) -> AuthDecision {
        let outcome = async {
            self.check_challenge(request).await?;
            self.check_signature(request).await?;
            self.check_authorization(request).await
        }
        .await;

        let now = self.clock.now_millis();
        match outcome {
            Ok(()) => AuthDecision::grant(now),
            Err(reason) => AuthDecision::deny(reason, now),
        }
    }

    pub(crate) async fn check_challenge(&self, request: &SignedRequest) -> Result<(), DenyReason> {
        self.issuer
            .consume(&request.client_id, &request.nonce)
            .await
            .map(|_| ())
            .map_err(|err| {
                tracing::debug!(client_id = %request.client_id, error = %err, "Challenge rejected");
                DenyReason::InvalidChallenge
            })
    }

    pub(crate) async fn check_signature(&self, request: &SignedRequest) -> Result<(), DenyReason> {
        let message = challenge_message(request.nonce.as_bytes());
        self.keystore
            .verify(&request.client_id, &message, &request.signature)
            .await
            .map_err(|err| {
                tracing::debug!(client_id = %request.client_id, error = %err, "Signature rejected");
                DenyReason::SignatureMismatch
            })
    }

    pub(crate) async fn check_authorization(
        &self,
        request: &SignedRequest,
    ) -> Result<(), DenyReason> {
        if self
            .registry
            .is_authorized(&request.client_id, &request.endpoint)
            .await
        {
            Ok(())
        } else {
            Err(DenyReason::AccessDenied)
        }
    }
}
