//! Key store error types.

use thiserror::Error;

/// Errors that can occur during key lifecycle operations.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// No key material exists for the client.
    #[error("Unknown client: {client_id}")]
    UnknownClient { client_id: String },

    /// Key material already exists; use rotation to replace it.
    #[error("Client already enrolled: {client_id}")]
    DuplicateClient { client_id: String },

    /// The client id is empty, too long, or has disallowed characters.
    #[error("Invalid client id: '{client_id}'")]
    InvalidClientId { client_id: String },
}

impl KeyStoreError {
    /// Check if this error indicates an unknown client.
    pub fn is_unknown_client(&self) -> bool {
        matches!(self, KeyStoreError::UnknownClient { .. })
    }

    /// Check if this error indicates the client already has a key.
    pub fn is_duplicate_client(&self) -> bool {
        matches!(self, KeyStoreError::DuplicateClient { .. })
    }

    /// Get the client id the error refers to.
    pub fn client_id(&self) -> &str {
        match self {
            KeyStoreError::UnknownClient { client_id }
            | KeyStoreError::DuplicateClient { client_id }
            | KeyStoreError::InvalidClientId { client_id } => client_id,
        }
    }
}

impl From<KeyStoreError> for crate::Error {
    fn from(err: KeyStoreError) -> Self {
        crate::Error::KeyStore(err)
    }
}
