//! Encryption of private key material
//!
//! Private keys are only ever written or handed out in sealed form:
//! - Argon2id derives a 256-bit key from a passphrase and salt
//! - AES-256-GCM encrypts the raw key bytes, with the public key bound in as
//!   associated data so a ciphertext cannot be re-labelled for another key

use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, AeadCore, OsRng, Payload},
};
use argon2::{
    Argon2,
    password_hash::{SaltString, rand_core},
};
use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{CryptoError, PrivateKey, PublicKey};

/// Salt string length for Argon2 (base64 encoded, 22 chars)
pub const SALT_LENGTH: usize = 22;

/// Nonce length for AES-GCM (12 bytes standard)
pub const NONCE_LENGTH: usize = 12;

/// Derived key length for AES-256 (32 bytes)
pub const KEY_LENGTH: usize = 32;

/// Symmetric key protecting private keys at rest.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SealingKey([u8; KEY_LENGTH]);

impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealingKey([REDACTED])")
    }
}

impl SealingKey {
    /// Random key for stores that do not outlive the process.
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        let mut bytes = [0u8; KEY_LENGTH];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Derive a key from a passphrase and a salt produced by [`generate_salt`].
    pub fn derive(passphrase: impl AsRef<str>, salt: impl AsRef<str>) -> Result<Self, CryptoError> {
        let salt_str = salt.as_ref();
        if salt_str.len() != SALT_LENGTH {
            return Err(CryptoError::InvalidSaltLength {
                expected: SALT_LENGTH,
                actual: salt_str.len(),
            });
        }

        let salt = SaltString::from_b64(salt_str).map_err(|e| CryptoError::SealingFailed {
            reason: format!("Invalid salt format: {e}"),
        })?;

        let mut key = [0u8; KEY_LENGTH];
        Argon2::default()
            .hash_password_into(
                passphrase.as_ref().as_bytes(),
                salt.as_str().as_bytes(),
                &mut key,
            )
            .map_err(|e| CryptoError::SealingFailed {
                reason: format!("Key derivation failed: {e}"),
            })?;

        Ok(Self(key))
    }

    /// Base64 form for storing a generated key in an operator-owned file.
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(Base64::encode_string(&self.0))
    }

    /// Parse a key written by [`to_base64`](Self::to_base64).
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let mut key = [0u8; KEY_LENGTH];
        let len = Base64::decode(encoded.trim(), &mut key)
            .map_err(|e| CryptoError::InvalidKeyFormat {
                reason: format!("sealing key is not valid base64: {e}"),
            })?
            .len();
        if len != KEY_LENGTH {
            key.zeroize();
            return Err(CryptoError::InvalidKeyFormat {
                reason: format!("sealing key must be {KEY_LENGTH} bytes, got {len}"),
            });
        }
        Ok(Self(key))
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(&self.0).map_err(|e| CryptoError::SealingFailed {
            reason: format!("Failed to create cipher: {e}"),
        })
    }
}

/// Generate a fresh Argon2 salt string.
pub fn generate_salt() -> String {
    SaltString::generate(&mut rand_core::OsRng).as_str().to_string()
}

/// A private key encrypted under a [`SealingKey`].
///
/// When `salt` is present the sealing key was derived from a passphrase with
/// that salt (an exported provisioning bundle); otherwise it is the store-wide
/// key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKey {
    pub algorithm: String,
    pub public_key: PublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    /// Base64 AES-GCM nonce
    pub nonce: String,
    /// Base64 ciphertext (key bytes + tag)
    pub ciphertext: String,
}

impl SealedKey {
    /// Seal a private key under an existing sealing key.
    pub fn seal(key: &PrivateKey, sealing_key: &SealingKey) -> Result<Self, CryptoError> {
        let public_key = key.public_key();
        let cipher = sealing_key.cipher()?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let key_bytes = key.to_bytes();
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: key_bytes.as_slice(),
                    aad: public_key.as_bytes(),
                },
            )
            .map_err(|e| CryptoError::SealingFailed {
                reason: format!("Encryption failed: {e}"),
            })?;

        Ok(Self {
            algorithm: key.algorithm().to_string(),
            public_key,
            salt: None,
            nonce: Base64::encode_string(&nonce),
            ciphertext: Base64::encode_string(&ciphertext),
        })
    }

    /// Seal a private key under a passphrase, generating a fresh salt.
    pub fn seal_with_passphrase(
        key: &PrivateKey,
        passphrase: impl AsRef<str>,
    ) -> Result<Self, CryptoError> {
        let salt = generate_salt();
        let sealing_key = SealingKey::derive(passphrase, &salt)?;
        let mut sealed = Self::seal(key, &sealing_key)?;
        sealed.salt = Some(salt);
        Ok(sealed)
    }

    /// Decrypt with the given sealing key.
    ///
    /// Fails if the ciphertext was tampered with or the recovered key does not
    /// match `public_key`.
    pub fn unseal(&self, sealing_key: &SealingKey) -> Result<PrivateKey, CryptoError> {
        let nonce_bytes =
            Base64::decode_vec(&self.nonce).map_err(|e| CryptoError::UnsealingFailed {
                reason: format!("Invalid base64 nonce: {e}"),
            })?;
        if nonce_bytes.len() != NONCE_LENGTH {
            return Err(CryptoError::InvalidNonceLength {
                expected: NONCE_LENGTH,
                actual: nonce_bytes.len(),
            });
        }
        let ciphertext =
            Base64::decode_vec(&self.ciphertext).map_err(|e| CryptoError::UnsealingFailed {
                reason: format!("Invalid base64 ciphertext: {e}"),
            })?;

        let cipher = sealing_key.cipher()?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let mut plaintext = cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext.as_slice(),
                    aad: self.public_key.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::UnsealingFailed {
                reason: "Decryption failed (wrong key or tampered data)".to_string(),
            })?;

        let key = PrivateKey::from_bytes(&self.algorithm, &plaintext);
        plaintext.zeroize();
        let key = key?;

        if key.public_key() != self.public_key {
            return Err(CryptoError::UnsealingFailed {
                reason: "Recovered key does not match sealed public key".to_string(),
            });
        }
        Ok(key)
    }

    /// Decrypt a passphrase-sealed bundle.
    pub fn unseal_with_passphrase(
        &self,
        passphrase: impl AsRef<str>,
    ) -> Result<PrivateKey, CryptoError> {
        let salt = self
            .salt
            .as_deref()
            .ok_or_else(|| CryptoError::UnsealingFailed {
                reason: "Sealed key carries no passphrase salt".to_string(),
            })?;
        let sealing_key = SealingKey::derive(passphrase, salt)?;
        self.unseal(&sealing_key)
    }
}
