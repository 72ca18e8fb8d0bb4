//!
//! Telegate: challenge-response authentication and access control for
//! telemetry endpoints.
//!
//! ## Core Concepts
//!
//! * **Keys (`keystore::KeyStore`)**: Each client owns one active Ed25519 key, generated and rotated inside the key store. Private keys leave it only sealed under a passphrase.
//! * **Access registry (`registry::AccessRegistry`)**: The authoritative record of which clients are active and which endpoints they may reach.
//! * **Challenges (`challenge::ChallengeIssuer`)**: Short-lived, single-use random nonces bound to one client.
//! * **Verification (`verifier::AuthVerifier`)**: Consumes the challenge, checks the signature, then consults the registry, producing an `AuthDecision`.
//! * **Gateway (`gateway::SessionGateway`)**: Orchestrates the handshake per request, counts and audits every decision, forwards granted requests, and exposes the administrator operations.
//! * **Persistence (`storage::Persistence`)**: Pluggable durable storage for keys and access records, with JSON-file and SQLite implementations.
//!
//! ## Example
//!
//! ```
//! # #[tokio::main]
//! # async fn main() -> telegate::Result<()> {
//! use std::sync::Arc;
//!
//! use telegate::crypto::SealingKey;
//! use telegate::gateway::{GatewayConfig, SessionGateway};
//! use telegate::identity::ClientId;
//! use telegate::registry::EndpointPattern;
//! use telegate::storage::InMemoryStore;
//! use telegate::{ClientSigner, ManualClock};
//!
//! let gateway = SessionGateway::new(
//!     Arc::new(InMemoryStore::new()),
//!     SealingKey::generate(),
//!     Arc::new(ManualClock::default()),
//!     GatewayConfig::default(),
//! );
//!
//! let c1 = ClientId::new("c1")?;
//! gateway
//!     .enroll(&c1, EndpointPattern::parse_list("/telemetry/c1_data")?)
//!     .await?;
//!
//! // Provision the client, then answer a challenge on its side.
//! let bundle = gateway.export_key(&c1, "provisioning secret").await?;
//! let signer = ClientSigner::unseal(c1.clone(), &bundle, "provisioning secret")?;
//!
//! let challenge = gateway.issue_challenge(&c1).await?;
//! let request = signer.sign_request(challenge.nonce, "/telemetry/c1_data");
//! let decision = gateway.authorize(&request).await;
//! assert!(decision.granted);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod challenge;
pub mod client;
pub mod clock;
pub mod crypto;
pub mod gateway;
pub mod identity;
pub mod keystore;
pub mod registry;
pub mod storage;
pub mod verifier;

pub use client::ClientSigner;
pub use clock::{Clock, ManualClock, SystemClock};
pub use gateway::SessionGateway;
pub use identity::{Address, ClientId, ClientIdentity};
pub use verifier::{AuthDecision, DenyReason, SignedRequest};

/// Result type used throughout the Telegate library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Telegate library.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured key and signature errors from the crypto module
    #[error(transparent)]
    Crypto(crypto::CryptoError),

    /// Structured key lifecycle errors from the keystore module
    #[error(transparent)]
    KeyStore(keystore::KeyStoreError),

    /// Structured access registry errors from the registry module
    #[error(transparent)]
    Registry(registry::RegistryError),

    /// Structured challenge errors from the challenge module
    #[error(transparent)]
    Challenge(challenge::ChallengeError),

    /// Structured persistence errors from the storage module
    #[error(transparent)]
    Storage(storage::StorageError),

    /// Structured forwarding errors from the gateway module
    #[error(transparent)]
    Gateway(gateway::GatewayError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Crypto(_) => "crypto",
            Error::KeyStore(_) => "keystore",
            Error::Registry(_) => "registry",
            Error::Challenge(_) => "challenge",
            Error::Storage(_) => "storage",
            Error::Gateway(_) => "gateway",
        }
    }

    /// Check if this error refers to a client that is not enrolled.
    pub fn is_unknown_client(&self) -> bool {
        match self {
            Error::KeyStore(err) => err.is_unknown_client(),
            Error::Registry(err) => err.is_unknown_client(),
            Error::Challenge(err) => err.is_unknown_client(),
            _ => false,
        }
    }

    /// Check if this error indicates the client is already enrolled.
    pub fn is_duplicate_client(&self) -> bool {
        match self {
            Error::KeyStore(err) => err.is_duplicate_client(),
            _ => false,
        }
    }

    /// Check if this error came from the persistence layer.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    /// Check if this error is challenge-related.
    pub fn is_challenge_error(&self) -> bool {
        matches!(self, Error::Challenge(_))
    }

    /// Check if this error is a failed signature check.
    pub fn is_invalid_signature(&self) -> bool {
        match self {
            Error::Crypto(err) => err.is_invalid_signature(),
            _ => false,
        }
    }

    /// Check if this error is caused by bad input rather than system state.
    pub fn is_validation_error(&self) -> bool {
        match self {
            Error::KeyStore(keystore::KeyStoreError::InvalidClientId { .. }) => true,
            Error::Registry(err) => err.is_invalid_pattern(),
            Error::Challenge(challenge::ChallengeError::MalformedNonce { .. }) => true,
            Error::Crypto(err) => err.is_key_format_error(),
            _ => false,
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Gateway(err) => err.is_not_found(),
            _ => self.is_unknown_client(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_and_predicates() {
        let err: Error = keystore::KeyStoreError::DuplicateClient {
            client_id: "c1".into(),
        }
        .into();
        assert_eq!(err.module(), "keystore");
        assert!(err.is_duplicate_client());
        assert!(!err.is_unknown_client());
        assert_eq!(err.to_string(), "Client already enrolled: c1");

        let err: Error = storage::StorageError::Unavailable {
            reason: "disk".into(),
        }
        .into();
        assert!(err.is_storage_failure());
        assert!(!err.is_not_found());

        let err: Error = challenge::ChallengeError::UnknownClient {
            client_id: "c9".into(),
        }
        .into();
        assert!(err.is_unknown_client());
        assert!(err.is_challenge_error());
        assert!(err.is_not_found());
    }
}
