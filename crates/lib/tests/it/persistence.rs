//! Write-through durability, and state left untouched when a write fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use telegate::{
    ClientId, ClientSigner, DenyReason, ManualClock, Result, SessionGateway,
    crypto::{SealingKey, sealing::generate_salt},
    gateway::GatewayConfig,
    registry::{AccessRecord, AccessStatus},
    storage::{InMemoryStore, Persistence, StoredKeys},
};

use crate::helpers::{FailingStore, TestGateway, id, patterns};

fn failing() -> (TestGateway, Arc<FailingStore>) {
    let store = Arc::new(FailingStore::new());
    let t = TestGateway::with_store(store.clone(), GatewayConfig::default());
    (t, store)
}

#[tokio::test]
async fn failed_revoke_leaves_client_active() {
    let (t, store) = failing();
    t.enroll("c1").await;

    store.fail_writes(true);
    let err = t.gateway.revoke_access(&id("c1")).await.unwrap_err();
    assert!(err.is_storage_failure());
    store.fail_writes(false);

    let record = t.gateway.registry().get(&id("c1")).await.unwrap();
    assert_eq!(record.status(), AccessStatus::Active);
    let request = t.signed_request("c1", "c1", "/telemetry/c1_data").await;
    assert!(t.gateway.authorize(&request).await.granted);
}

#[tokio::test]
async fn failed_rotation_keeps_old_key() {
    let (t, store) = failing();
    let identity = t.enroll("c1").await;
    let request = t.signed_request("c1", "c1", "/telemetry/c1_data").await;

    store.fail_writes(true);
    let err = t.gateway.rotate_keys(&id("c1")).await.unwrap_err();
    assert!(err.is_storage_failure());

    let info = t.gateway.keystore().info(&id("c1")).await.unwrap();
    assert_eq!(info.address, identity.address);
    assert_eq!(info.rotation_epoch, 0);

    // Counting the access needs a write too, so re-enable first
    store.fail_writes(false);
    assert!(t.gateway.authorize(&request).await.granted);
}

#[tokio::test]
async fn failed_enrollment_leaves_no_trace() {
    let (t, store) = failing();
    store.fail_writes(true);
    let err = t
        .gateway
        .enroll(&id("c1"), patterns("/telemetry/c1_data"))
        .await
        .unwrap_err();
    assert!(err.is_storage_failure());
    assert!(t.gateway.list_clients().await.is_empty());
    assert!(!t.gateway.keystore().contains(&id("c1")).await);

    store.fail_writes(false);
    t.enroll("c1").await;
}

#[tokio::test]
async fn unrecorded_access_is_denied_with_storage_failure() {
    let (t, store) = failing();
    t.enroll("c1").await;
    let request = t.signed_request("c1", "c1", "/telemetry/c1_data").await;

    store.fail_writes(true);
    let decision = t.gateway.authorize(&request).await;
    assert_eq!(decision.reason, Some(DenyReason::StorageFailure));
    assert_eq!(t.gateway.registry().get(&id("c1")).await.unwrap().request_count(), 0);

    let events = t.gateway.events_for(&id("c1")).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].decision.reason, Some(DenyReason::StorageFailure));
}

#[tokio::test]
async fn failed_deenroll_keeps_client() {
    let (t, store) = failing();
    t.enroll("c1").await;
    store.fail_writes(true);
    assert!(t.gateway.deenroll(&id("c1")).await.unwrap_err().is_storage_failure());
    assert_eq!(t.gateway.list_clients().await.len(), 1);
}

/// Store whose deletes stall after committing, holding a de-enrollment open
/// long enough for other writers to line up behind it.
#[derive(Default)]
struct SlowDeleteStore {
    inner: InMemoryStore,
}

#[async_trait]
impl Persistence for SlowDeleteStore {
    fn kind(&self) -> &'static str {
        "slow-delete"
    }

    async fn load_keys(&self, client_id: &ClientId) -> Result<Option<StoredKeys>> {
        self.inner.load_keys(client_id).await
    }

    async fn save_keys(&self, record: &StoredKeys) -> Result<()> {
        self.inner.save_keys(record).await
    }

    async fn load_access(&self, client_id: &ClientId) -> Result<Option<AccessRecord>> {
        self.inner.load_access(client_id).await
    }

    async fn save_access(&self, record: &AccessRecord) -> Result<()> {
        self.inner.save_access(record).await
    }

    async fn delete(&self, client_id: &ClientId) -> Result<()> {
        self.inner.delete(client_id).await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }

    async fn client_ids(&self) -> Result<Vec<ClientId>> {
        self.inner.client_ids().await
    }
}

#[tokio::test]
async fn deenroll_is_not_undone_by_concurrent_writers() {
    let store = Arc::new(SlowDeleteStore::default());
    let key = SealingKey::generate();
    let clock = Arc::new(ManualClock::default());
    let gateway =
        SessionGateway::new(store.clone(), key.clone(), clock.clone(), GatewayConfig::default());
    gateway
        .enroll(&id("c1"), patterns("/telemetry/c1_data"))
        .await
        .unwrap();
    let bundle = gateway.export_key(&id("c1"), "pw").await.unwrap();
    let signer = ClientSigner::unseal(id("c1"), &bundle, "pw").unwrap();
    let challenge = gateway.issue_challenge(&id("c1")).await.unwrap();
    let request = signer.sign_request(challenge.nonce, "/telemetry/c1_data");

    // The other writers start while the delete is still stalled
    let behind = Duration::from_millis(10);
    let c1 = id("c1");
    let (removed, rotated, regranted, decision) = tokio::join!(
        gateway.deenroll(&c1),
        async {
            tokio::time::sleep(behind).await;
            gateway.rotate_keys(&id("c1")).await
        },
        async {
            tokio::time::sleep(behind).await;
            gateway.grant_access(&id("c1"), patterns("/files/c1/*")).await
        },
        async {
            tokio::time::sleep(behind).await;
            gateway.authorize(&request).await
        },
    );

    removed.unwrap();
    assert!(rotated.unwrap_err().is_unknown_client());
    assert!(regranted.unwrap_err().is_unknown_client());
    assert!(!decision.granted);
    assert!(store.client_ids().await.unwrap().is_empty());

    let reopened = SessionGateway::open(store, key, clock, GatewayConfig::default())
        .await
        .unwrap();
    assert!(reopened.list_clients().await.is_empty());
    assert_eq!(reopened.registry().get(&id("c1")).await, None);
}

#[tokio::test]
async fn file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telegate.json");
    let salt = generate_salt();
    let clock = Arc::new(ManualClock::default());

    let (rotated_address, listing) = {
        let store: Arc<dyn Persistence> = Arc::new(InMemoryStore::open(&path).await.unwrap());
        let key = SealingKey::derive("operator secret", &salt).unwrap();
        let gateway = SessionGateway::new(store, key, clock.clone(), GatewayConfig::default());
        gateway
            .enroll(&id("c1"), patterns("/telemetry/c1_data"))
            .await
            .unwrap();
        gateway.enroll(&id("c2"), patterns("/files/c2/*")).await.unwrap();
        let address = gateway.rotate_keys(&id("c1")).await.unwrap();
        gateway.revoke_access(&id("c2")).await.unwrap();
        gateway.test_connection(&id("c1")).await.unwrap();
        (address, gateway.list_clients().await)
    };

    let store: Arc<dyn Persistence> = Arc::new(InMemoryStore::open(&path).await.unwrap());
    let key = SealingKey::derive("operator secret", &salt).unwrap();
    let gateway = SessionGateway::open(store, key, clock, GatewayConfig::default())
        .await
        .unwrap();

    assert_eq!(gateway.list_clients().await, listing);
    assert_eq!(gateway.client_by_address(&rotated_address).await, Some(id("c1")));
    assert!(gateway.test_connection(&id("c1")).await.unwrap().granted);
    assert_eq!(
        gateway.test_connection(&id("c2")).await.unwrap().reason,
        Some(DenyReason::AccessDenied)
    );
}

#[tokio::test]
async fn restart_with_wrong_passphrase_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telegate.json");
    let salt = generate_salt();
    let clock = Arc::new(ManualClock::default());
    {
        let store: Arc<dyn Persistence> = Arc::new(InMemoryStore::open(&path).await.unwrap());
        let key = SealingKey::derive("right", &salt).unwrap();
        let gateway = SessionGateway::new(store, key, clock.clone(), GatewayConfig::default());
        gateway.enroll(&id("c1"), patterns("/a")).await.unwrap();
    }

    let store: Arc<dyn Persistence> = Arc::new(InMemoryStore::open(&path).await.unwrap());
    let key = SealingKey::derive("wrong", &salt).unwrap();
    let result = SessionGateway::open(store, key, clock, GatewayConfig::default()).await;
    assert!(result.is_err());
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn sqlite_store_survives_restart() {
    use telegate::storage::SqliteStore;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telegate.db");
    let key = SealingKey::generate();
    let clock = Arc::new(ManualClock::default());
    let listing = {
        let store: Arc<dyn Persistence> = Arc::new(SqliteStore::open(&path).await.unwrap());
        let gateway =
            SessionGateway::new(store, key.clone(), clock.clone(), GatewayConfig::default());
        gateway
            .enroll(&id("c1"), patterns("/telemetry/c1_data"))
            .await
            .unwrap();
        gateway.test_connection(&id("c1")).await.unwrap();
        gateway.list_clients().await
    };

    let store: Arc<dyn Persistence> = Arc::new(SqliteStore::open(&path).await.unwrap());
    let gateway = SessionGateway::open(store, key, clock, GatewayConfig::default())
        .await
        .unwrap();
    assert_eq!(gateway.list_clients().await, listing);
    assert_eq!(listing[0].request_count, 1);
}
