//! Access registry error types.

use thiserror::Error;

/// Errors that can occur while managing access records.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No access record exists for the client.
    #[error("Unknown client: {client_id}")]
    UnknownClient { client_id: String },

    /// An endpoint pattern could not be parsed.
    #[error("Invalid endpoint pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl RegistryError {
    /// Check if this error indicates an unknown client.
    pub fn is_unknown_client(&self) -> bool {
        matches!(self, RegistryError::UnknownClient { .. })
    }

    /// Check if this error indicates a malformed endpoint pattern.
    pub fn is_invalid_pattern(&self) -> bool {
        matches!(self, RegistryError::InvalidPattern { .. })
    }
}

impl From<RegistryError> for crate::Error {
    fn from(err: RegistryError) -> Self {
        crate::Error::Registry(err)
    }
}
