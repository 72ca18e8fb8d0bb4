//! Client-side signing.
//!
//! A telemetry client receives its key as a [`SealedKey`] bundle exported
//! by the gateway, unseals it with the provisioning passphrase, and answers
//! challenges with [`ClientSigner::sign_challenge`].

use crate::Result;
use crate::challenge::Nonce;
use crate::crypto::{PrivateKey, PublicKey, SealedKey};
use crate::identity::{Address, ClientId};
use crate::verifier::SignedRequest;

/// Holds one client's unsealed key.
#[derive(Debug)]
pub struct ClientSigner {
    client_id: ClientId,
    key: PrivateKey,
}

impl ClientSigner {
    /// Unseal a provisioning bundle.
    pub fn unseal(
        client_id: ClientId,
        bundle: &SealedKey,
        passphrase: impl AsRef<str>,
    ) -> Result<Self> {
        let key = bundle.unseal_with_passphrase(passphrase)?;
        Ok(Self { client_id, key })
    }

    /// Parse a JSON bundle as produced by the export endpoint and unseal it.
    pub fn from_bundle_json(
        client_id: ClientId,
        json: &str,
        passphrase: impl AsRef<str>,
    ) -> Result<Self> {
        let bundle: SealedKey = serde_json::from_str(json).map_err(|e| {
            crate::crypto::CryptoError::InvalidKeyFormat {
                reason: e.to_string(),
            }
        })?;
        Self::unseal(client_id, &bundle, passphrase)
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.key.public_key())
    }

    pub fn sign_challenge(&self, nonce: &Nonce) -> Vec<u8> {
        self.key.sign_challenge(nonce.as_bytes())
    }

    /// Build the request a gateway expects for `endpoint`.
    pub fn sign_request(&self, nonce: Nonce, endpoint: impl Into<String>) -> SignedRequest {
        let signature = self.sign_challenge(&nonce);
        SignedRequest::new(self.client_id.clone(), nonce, signature, endpoint)
    }
}
