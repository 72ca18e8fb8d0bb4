use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use telegate::{
    ClientId, ManualClock, Result, SessionGateway, SignedRequest,
    challenge::Challenge,
    crypto::SealingKey,
    gateway::GatewayConfig,
    identity::ClientIdentity,
    registry::{AccessRecord, EndpointPattern},
    storage::{InMemoryStore, Persistence, StorageError, StoredKeys},
};

// ==========================
// CORE TEST FACTORIES
// ==========================

/// Creates a test store based on TEST_BACKEND env var.
///
/// Supported values:
/// - "inmemory" or unset: InMemoryStore (default)
/// - "sqlite": SQLite in-memory database (requires `sqlite` feature)
///
/// # Example
/// ```bash
/// TEST_BACKEND=sqlite cargo test
/// ```
pub async fn test_store() -> Arc<dyn Persistence> {
    match std::env::var("TEST_BACKEND").as_deref() {
        Ok("sqlite") => {
            #[cfg(feature = "sqlite")]
            {
                use telegate::storage::SqliteStore;
                Arc::new(
                    SqliteStore::open_in_memory()
                        .await
                        .expect("Failed to create SQLite store"),
                )
            }
            #[cfg(not(feature = "sqlite"))]
            {
                panic!("TEST_BACKEND=sqlite requires the 'sqlite' feature to be enabled")
            }
        }
        Ok("inmemory") | Ok("") | Err(_) => Arc::new(InMemoryStore::new()),
        Ok(other) => {
            panic!("Unknown TEST_BACKEND value: {other}. Supported: inmemory, sqlite")
        }
    }
}

pub fn id(s: &str) -> ClientId {
    ClientId::new(s).expect("valid client id")
}

pub fn patterns(list: &str) -> Vec<EndpointPattern> {
    EndpointPattern::parse_list(list).expect("valid endpoint patterns")
}

/// A gateway with a controllable clock.
pub struct TestGateway {
    pub gateway: SessionGateway,
    pub clock: Arc<ManualClock>,
}

impl TestGateway {
    pub async fn new() -> Self {
        Self::with_config(GatewayConfig::default()).await
    }

    pub async fn with_config(config: GatewayConfig) -> Self {
        Self::with_store(test_store().await, config)
    }

    pub fn with_store(store: Arc<dyn Persistence>, config: GatewayConfig) -> Self {
        let clock = Arc::new(ManualClock::default());
        let gateway = SessionGateway::new(store, SealingKey::generate(), clock.clone(), config);
        Self { gateway, clock }
    }

    /// Enroll `client` with access to `/telemetry/<client>_data` and `/files/<client>/*`.
    pub async fn enroll(&self, client: &str) -> ClientIdentity {
        let endpoints = patterns(&format!("/telemetry/{client}_data,/files/{client}/*"));
        self.gateway
            .enroll(&id(client), endpoints)
            .await
            .expect("Failed to enroll client")
    }

    /// Issue a challenge for `client` and sign it with `signer`'s key.
    pub async fn signed_request(&self, client: &str, signer: &str, endpoint: &str) -> SignedRequest {
        let challenge = self.challenge(client).await;
        self.sign(challenge, signer, endpoint).await
    }

    pub async fn challenge(&self, client: &str) -> Challenge {
        self.gateway
            .issue_challenge(&id(client))
            .await
            .expect("Failed to issue challenge")
    }

    /// Sign with a provisioned copy of `signer`'s current key.
    pub async fn sign(&self, challenge: Challenge, signer: &str, endpoint: &str) -> SignedRequest {
        let bundle = self
            .gateway
            .export_key(&id(signer), "test-passphrase")
            .await
            .expect("Failed to export key");
        let key = telegate::ClientSigner::unseal(id(signer), &bundle, "test-passphrase")
            .expect("Failed to unseal key");
        let signature = key.sign_challenge(&challenge.nonce);
        SignedRequest::new(challenge.client_id, challenge.nonce, signature, endpoint)
    }
}

/// Persistence wrapper whose writes can be made to fail on demand.
#[derive(Default)]
pub struct FailingStore {
    inner: InMemoryStore,
    fail_writes: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "injected write failure".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for FailingStore {
    fn kind(&self) -> &'static str {
        "failing"
    }

    async fn load_keys(&self, client_id: &ClientId) -> Result<Option<StoredKeys>> {
        self.inner.load_keys(client_id).await
    }

    async fn save_keys(&self, record: &StoredKeys) -> Result<()> {
        self.check()?;
        self.inner.save_keys(record).await
    }

    async fn load_access(&self, client_id: &ClientId) -> Result<Option<AccessRecord>> {
        self.inner.load_access(client_id).await
    }

    async fn save_access(&self, record: &AccessRecord) -> Result<()> {
        self.check()?;
        self.inner.save_access(record).await
    }

    async fn delete(&self, client_id: &ClientId) -> Result<()> {
        self.check()?;
        self.inner.delete(client_id).await
    }

    async fn client_ids(&self) -> Result<Vec<ClientId>> {
        self.inner.client_ids().await
    }
}
