//! Signature keys and challenge framing
//!
//! Clients hold Ed25519 keys. A [`PrivateKey`] has no serialization impls;
//! key material leaves memory only through [`sealing`].

pub mod errors;
pub mod sealing;

use std::fmt;
use std::str::FromStr;

use base64ct::{Base64, Encoding};
use ed25519_dalek::{PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH, Signature, Signer, SigningKey, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{ZeroizeOnDrop, Zeroizing};

pub use errors::CryptoError;
pub use sealing::{SealedKey, SealingKey};

/// Algorithm tag carried by encoded keys and sealed bundles.
pub const KEY_ALGORITHM: &str = "ed25519";

/// Size of challenge nonces in bytes (256 bits)
pub const NONCE_SIZE: usize = 32;

/// Domain separator prepended to every nonce before signing.
pub const CHALLENGE_DOMAIN: &[u8] = b"telegate/challenge/v1\0";

/// Verifying half of a client key.
///
/// Encoded as `ed25519:<base64>` in JSON and in listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Strict Ed25519 verification; rejects malleable and small-order inputs.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let bytes: &[u8; SIGNATURE_LENGTH] = signature
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature)?;
        self.0
            .verify_strict(message, &Signature::from_bytes(bytes))
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// Raw key bytes, used for address derivation.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{KEY_ALGORITHM}:{}", Base64::encode_string(self.0.as_bytes()))
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoded = s
            .strip_prefix(KEY_ALGORITHM)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| CryptoError::InvalidKeyFormat {
                reason: format!("expected '{KEY_ALGORITHM}:<base64>'"),
            })?;
        let mut bytes = [0u8; PUBLIC_KEY_LENGTH];
        let decoded_len = Base64::decode(encoded, &mut bytes)
            .map_err(|e| CryptoError::InvalidKeyFormat {
                reason: format!("public key is not valid base64 of 32 bytes: {e}"),
            })?
            .len();
        if decoded_len != PUBLIC_KEY_LENGTH {
            return Err(CryptoError::InvalidKeyFormat {
                reason: format!("public key must be {PUBLIC_KEY_LENGTH} bytes, got {decoded_len}"),
            });
        }
        VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|e| CryptoError::KeyParsingFailed {
                reason: e.to_string(),
            })
    }
}

impl TryFrom<String> for PublicKey {
    type Error = CryptoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_string()
    }
}

/// Signing half of a client key. The inner key zeroizes itself on drop.
pub struct PrivateKey(SigningKey);

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

impl PrivateKey {
    pub fn generate() -> Self {
        Self(SigningKey::generate(&mut OsRng))
    }

    /// Sign arbitrary bytes. Challenge answers go through [`Self::sign_challenge`].
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.0.sign(message).to_bytes().to_vec()
    }

    /// Sign a challenge nonce using the framing expected by the verifier.
    pub fn sign_challenge(&self, nonce: &[u8]) -> Vec<u8> {
        self.sign(&challenge_message(nonce))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn algorithm(&self) -> &'static str {
        KEY_ALGORITHM
    }

    pub(crate) fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.to_bytes().to_vec())
    }

    pub(crate) fn from_bytes(algorithm: &str, bytes: &[u8]) -> Result<Self, CryptoError> {
        if algorithm != KEY_ALGORITHM {
            return Err(CryptoError::InvalidKeyFormat {
                reason: format!("unsupported key algorithm '{algorithm}'"),
            });
        }
        let secret: Zeroizing<[u8; 32]> =
            Zeroizing::new(bytes.try_into().map_err(|_| CryptoError::InvalidKeyFormat {
                reason: format!("private key must be 32 bytes, got {}", bytes.len()),
            })?);
        Ok(Self(SigningKey::from_bytes(&secret)))
    }
}

impl ZeroizeOnDrop for PrivateKey {}

/// Build the byte string a client signs for a challenge nonce.
pub fn challenge_message(nonce: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(CHALLENGE_DOMAIN.len() + nonce.len());
    message.extend_from_slice(CHALLENGE_DOMAIN);
    message.extend_from_slice(nonce);
    message
}

/// Draw nonce bytes from the operating system's CSPRNG.
pub fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Short BLAKE3 fingerprint used to refer to a nonce in logs and audit events
/// without revealing it.
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = blake3::hash(bytes);
    hex::encode(&digest.as_bytes()[..8])
}
