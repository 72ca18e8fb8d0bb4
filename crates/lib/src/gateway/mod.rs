//! Session gateway
//!
//! [`SessionGateway`] is the single entry point for clients and
//! administrators. It wires the key store, access registry, challenge
//! issuer and verifier together, records every decision in the audit log,
//! and forwards granted requests to an [`Upstream`].
//!
//! The gateway holds no per-client session: every protected request carries
//! its own freshly signed challenge.

pub mod admin;
pub mod config;
pub mod errors;
pub mod upstream;

use std::sync::Arc;

use crate::Result;
use crate::audit::{AccessEvent, AuditLog};
use crate::challenge::{Challenge, ChallengeIssuer};
use crate::clock::Clock;
use crate::crypto::SealingKey;
use crate::identity::ClientId;
use crate::keystore::KeyStore;
use crate::registry::AccessRegistry;
use crate::storage::Persistence;
use crate::verifier::{AuthDecision, AuthVerifier, DenyReason, SignedRequest};

pub use admin::ClientSummary;
pub use config::GatewayConfig;
pub use errors::GatewayError;
pub use upstream::{GatewayResponse, Upstream};

/// Orchestrates challenge issuance, verification and access accounting.
pub struct SessionGateway {
    keystore: Arc<KeyStore>,
    registry: Arc<AccessRegistry>,
    issuer: Arc<ChallengeIssuer>,
    verifier: AuthVerifier,
    audit: AuditLog,
    store: Arc<dyn Persistence>,
    clock: Arc<dyn Clock>,
    config: GatewayConfig,
}

impl SessionGateway {
    /// Create a gateway with no clients, persisting into `store`.
    pub fn new(
        store: Arc<dyn Persistence>,
        sealing_key: SealingKey,
        clock: Arc<dyn Clock>,
        config: GatewayConfig,
    ) -> Self {
        let keystore = KeyStore::new(sealing_key, store.clone(), clock.clone());
        let registry = AccessRegistry::new(store.clone(), clock.clone());
        Self::assemble(keystore, registry, store, clock, config)
    }

    /// Create a gateway and load every client already held by `store`.
    ///
    /// Fails if a stored key cannot be unsealed with `sealing_key`.
    pub async fn open(
        store: Arc<dyn Persistence>,
        sealing_key: SealingKey,
        clock: Arc<dyn Clock>,
        config: GatewayConfig,
    ) -> Result<Self> {
        let keystore = KeyStore::open(sealing_key, store.clone(), clock.clone()).await?;
        let registry = AccessRegistry::open(store.clone(), clock.clone()).await?;
        tracing::info!(backend = store.kind(), "Opened gateway");
        Ok(Self::assemble(keystore, registry, store, clock, config))
    }

    fn assemble(
        keystore: KeyStore,
        registry: AccessRegistry,
        store: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
        config: GatewayConfig,
    ) -> Self {
        let keystore = Arc::new(keystore.with_rotation_grace(config.rotation_grace));
        let registry = Arc::new(registry);
        let issuer = Arc::new(
            ChallengeIssuer::new(keystore.clone(), clock.clone())
                .with_ttl(config.challenge_ttl)
                .with_max_pending(config.max_pending_challenges_per_client),
        );
        let verifier = AuthVerifier::new(
            issuer.clone(),
            keystore.clone(),
            registry.clone(),
            clock.clone(),
        );
        Self {
            keystore,
            registry,
            issuer,
            verifier,
            audit: AuditLog::new(config.audit_capacity),
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Name of the persistence backend.
    pub fn backend_kind(&self) -> &'static str {
        self.store.kind()
    }

    pub fn keystore(&self) -> &KeyStore {
        &self.keystore
    }

    pub fn registry(&self) -> &AccessRegistry {
        &self.registry
    }

    pub fn issuer(&self) -> &ChallengeIssuer {
        &self.issuer
    }

    /// Start a handshake for `client_id`.
    pub async fn issue_challenge(&self, client_id: &ClientId) -> Result<Challenge> {
        Ok(self.issuer.issue(client_id).await?)
    }

    /// Decide one signed request.
    ///
    /// A granted request is counted on the client's access record before
    /// the decision is returned; if that write fails the request is denied
    /// with [`DenyReason::StorageFailure`]. Every decision is audited.
    pub async fn authorize(&self, request: &SignedRequest) -> AuthDecision {
        let mut decision = self.verifier.verify(request).await;

        if decision.granted
            && let Err(err) = self.registry.record_access(&request.client_id).await
        {
            tracing::warn!(client_id = %request.client_id, error = %err, "Failed to record access");
            decision = AuthDecision::deny(DenyReason::StorageFailure, self.clock.now_millis());
        }

        let fingerprint = request.nonce.fingerprint();
        match decision.reason {
            None => tracing::debug!(
                client_id = %request.client_id,
                endpoint = %request.endpoint,
                nonce = %fingerprint,
                "Access granted"
            ),
            Some(reason) => tracing::warn!(
                client_id = %request.client_id,
                endpoint = %request.endpoint,
                nonce = %fingerprint,
                reason = ?reason,
                "Access denied"
            ),
        }

        self.audit
            .append(AccessEvent::new(
                request.client_id.clone(),
                request.endpoint.clone(),
                decision,
                fingerprint,
            ))
            .await;
        decision
    }

    /// Authorize and, only if granted, forward to `upstream`.
    pub async fn handle<U>(&self, request: &SignedRequest, upstream: &U) -> Result<GatewayResponse>
    where
        U: Upstream + ?Sized,
    {
        let decision = self.authorize(request).await;
        if !decision.granted {
            return Ok(GatewayResponse {
                decision,
                body: None,
            });
        }
        let body = upstream
            .forward(&request.client_id, &request.endpoint)
            .await?;
        Ok(GatewayResponse {
            decision,
            body: Some(body),
        })
    }

    /// Drop expired challenges. Returns how many were removed.
    pub async fn purge_expired_challenges(&self) -> usize {
        self.issuer.purge_expired().await
    }

    /// Up to `limit` most recent audit events, newest first.
    pub async fn events(&self, limit: usize) -> Vec<AccessEvent> {
        self.audit.recent(limit).await
    }

    /// Retained audit events for one client, oldest first.
    pub async fn events_for(&self, client_id: &ClientId) -> Vec<AccessEvent> {
        self.audit.for_client(client_id).await
    }
}
