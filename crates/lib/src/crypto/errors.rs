//! Error types for key handling and key sealing.

use thiserror::Error as ThisError;

use crate::Error;

/// Errors raised while parsing keys, verifying signatures, or sealing
/// private key material.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum CryptoError {
    /// Invalid key format or parsing error.
    #[error("Invalid key format: {reason}")]
    InvalidKeyFormat {
        /// Description of why the key format is invalid
        reason: String,
    },

    /// Key parsing failed inside the signature library.
    #[error("Key parsing failed: {reason}")]
    KeyParsingFailed {
        /// Description of the parsing failure
        reason: String,
    },

    /// Signature bytes were malformed or did not verify.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Encrypting private key material failed.
    #[error("Sealing failed: {reason}")]
    SealingFailed {
        /// Description of the failure
        reason: String,
    },

    /// Decrypting private key material failed (wrong passphrase or tampered data).
    #[error("Unsealing failed: {reason}")]
    UnsealingFailed {
        /// Description of the failure
        reason: String,
    },

    /// Salt string had the wrong length.
    #[error("Invalid salt length: expected {expected}, got {actual}")]
    InvalidSaltLength { expected: usize, actual: usize },

    /// AEAD nonce had the wrong length.
    #[error("Invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },
}

impl CryptoError {
    /// Check if this error indicates a bad signature.
    pub fn is_invalid_signature(&self) -> bool {
        matches!(self, CryptoError::InvalidSignature)
    }

    /// Check if this error came from malformed key input.
    pub fn is_key_format_error(&self) -> bool {
        matches!(
            self,
            CryptoError::InvalidKeyFormat { .. } | CryptoError::KeyParsingFailed { .. }
        )
    }

    /// Check if this error came from sealing or unsealing.
    pub fn is_sealing_error(&self) -> bool {
        matches!(
            self,
            CryptoError::SealingFailed { .. }
                | CryptoError::UnsealingFailed { .. }
                | CryptoError::InvalidSaltLength { .. }
                | CryptoError::InvalidNonceLength { .. }
        )
    }
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        Error::Crypto(err)
    }
}
