//! Administrator operations on the gateway.

use serde::{Deserialize, Serialize};

use super::SessionGateway;
use crate::Result;
use crate::audit::AccessStats;
use crate::crypto::SealedKey;
use crate::identity::{Address, ClientId, ClientIdentity};
use crate::keystore::KeyStoreError;
use crate::registry::{AccessRecord, AccessStatus, EndpointPattern};
use crate::verifier::{AuthDecision, SignedRequest};

/// One row of the client listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSummary {
    pub client_id: ClientId,
    pub address: Address,
    pub status: AccessStatus,
    pub last_access_at: Option<u64>,
    pub request_count: u64,
    pub rotation_epoch: u64,
    pub endpoints: Vec<EndpointPattern>,
}

impl SessionGateway {
    /// Give a new client a key and grant it `endpoints`.
    pub async fn enroll(
        &self,
        client_id: &ClientId,
        endpoints: impl IntoIterator<Item = EndpointPattern>,
    ) -> Result<ClientIdentity> {
        let info = self.keystore.generate(client_id).await?;
        if let Err(err) = self.registry.grant(client_id, endpoints).await {
            // Undo the key so the client can be enrolled again.
            if let Err(cleanup) = self.remove_client(client_id).await {
                tracing::warn!(client_id = %client_id, error = %cleanup, "Failed to roll back enrollment");
            }
            return Err(err);
        }
        tracing::info!(client_id = %client_id, address = %info.address, "Enrolled client");
        Ok(ClientIdentity::new(client_id.clone(), info.public_key))
    }

    /// Activate an enrolled client with `endpoints`, replacing its previous
    /// entitlements. The only way back from revocation.
    pub async fn grant_access(
        &self,
        client_id: &ClientId,
        endpoints: impl IntoIterator<Item = EndpointPattern>,
    ) -> Result<AccessRecord> {
        self.keystore
            .with_enrolled(client_id, self.registry.grant(client_id, endpoints))
            .await
    }

    /// Remove a client entirely: key, access record and pending challenges.
    pub async fn deenroll(&self, client_id: &ClientId) -> Result<()> {
        let dropped = self.remove_client(client_id).await?;
        tracing::info!(client_id = %client_id, dropped_challenges = dropped, "De-enrolled client");
        Ok(())
    }

    /// Delete the persisted client and its in-memory state as one step.
    ///
    /// Both slot maps are held exclusively across the store delete, so no
    /// concurrent rotation, grant or access count can write the client back.
    /// On a failed delete nothing in memory changes.
    async fn remove_client(&self, client_id: &ClientId) -> Result<usize> {
        let mut keys = self.keystore.lock_exclusive().await;
        let mut records = self.registry.lock_exclusive().await;
        if !keys.contains(client_id) && !records.contains(client_id) {
            return Err(unknown(client_id));
        }
        self.store.delete(client_id).await?;
        keys.remove(client_id);
        records.remove(client_id);
        Ok(self.issuer.forget_client(client_id).await)
    }

    /// Export a client's key sealed under `passphrase` for provisioning.
    pub async fn export_key(
        &self,
        client_id: &ClientId,
        passphrase: impl AsRef<str>,
    ) -> Result<SealedKey> {
        self.keystore.export_sealed(client_id, passphrase).await
    }

    /// Every enrolled client, ordered by client id.
    pub async fn list_clients(&self) -> Vec<ClientSummary> {
        let mut out = Vec::new();
        for info in self.keystore.list().await {
            let record = self.registry.get(&info.client_id).await;
            out.push(ClientSummary {
                status: record
                    .as_ref()
                    .map_or(AccessStatus::Revoked, AccessRecord::status),
                last_access_at: record.as_ref().and_then(AccessRecord::last_access_at),
                request_count: record.as_ref().map_or(0, AccessRecord::request_count),
                endpoints: record
                    .map(|r| r.entitled_endpoints().iter().cloned().collect())
                    .unwrap_or_default(),
                client_id: info.client_id,
                address: info.address,
                rotation_epoch: info.rotation_epoch,
            });
        }
        out
    }

    /// Run one full handshake for `client_id`, signing inside the key store.
    ///
    /// The test request targets the client's first entitlement. A client with no
    /// entitlements is tested at `/`, which nothing matches.
    pub async fn test_connection(&self, client_id: &ClientId) -> Result<AuthDecision> {
        let endpoint = self
            .registry
            .get(client_id)
            .await
            .and_then(|r| r.entitled_endpoints().iter().next().map(EndpointPattern::sample_path))
            .unwrap_or_else(|| "/".to_string());

        let challenge = self.issue_challenge(client_id).await?;
        let signature = self
            .keystore
            .sign_challenge(client_id, challenge.nonce.as_bytes())
            .await?;
        let request = SignedRequest::new(client_id.clone(), challenge.nonce, signature, endpoint);
        let decision = self.authorize(&request).await;
        tracing::info!(client_id = %client_id, granted = decision.granted, "Connection test");
        Ok(decision)
    }

    /// Withdraw a client's access without touching its identity.
    pub async fn revoke_access(&self, client_id: &ClientId) -> Result<()> {
        self.registry.revoke(client_id).await
    }

    /// Replace a client's key; returns the new address only.
    pub async fn rotate_keys(&self, client_id: &ClientId) -> Result<Address> {
        Ok(self.keystore.rotate(client_id).await?.address)
    }

    pub async fn client_by_address(&self, address: &Address) -> Option<ClientId> {
        self.keystore.client_by_address(address).await
    }

    pub async fn stats(&self) -> AccessStats {
        let clients = self.list_clients().await;
        let active_clients = clients
            .iter()
            .filter(|c| c.status == AccessStatus::Active)
            .count();
        AccessStats {
            total_clients: clients.len(),
            active_clients,
            revoked_clients: clients.len() - active_clients,
            granted: self.audit.granted(),
            denied: self.audit.denied(),
            pending_challenges: self.issuer.outstanding().await,
            evicted_events: self.audit.evicted(),
        }
    }
}

fn unknown(client_id: &ClientId) -> crate::Error {
    KeyStoreError::UnknownClient {
        client_id: client_id.to_string(),
    }
    .into()
}
