use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use telegate::{
    ClientId, ClientSigner, DenyReason, Result,
    gateway::{GatewayConfig, GatewayError, Upstream},
    registry::AccessStatus,
};

use crate::helpers::{TestGateway, id, patterns};

/// Serves fixed payloads and counts what reaches it.
#[derive(Default)]
struct RecordingUpstream {
    resources: HashMap<String, Vec<u8>>,
    forwarded: AtomicUsize,
}

impl RecordingUpstream {
    fn with(endpoint: &str, body: &[u8]) -> Self {
        let mut upstream = Self::default();
        upstream
            .resources
            .insert(endpoint.to_string(), body.to_vec());
        upstream
    }
}

#[async_trait]
impl Upstream for RecordingUpstream {
    async fn forward(&self, _client_id: &ClientId, endpoint: &str) -> Result<Vec<u8>> {
        self.forwarded.fetch_add(1, Ordering::SeqCst);
        self.resources
            .get(endpoint)
            .cloned()
            .ok_or_else(|| {
                GatewayError::ResourceNotFound {
                    endpoint: endpoint.to_string(),
                }
                .into()
            })
    }
}

#[tokio::test]
async fn granted_requests_are_forwarded() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;
    let upstream = RecordingUpstream::with("/files/c1/latest_update", b"speed=312");

    let request = t.signed_request("c1", "c1", "/files/c1/latest_update").await;
    let response = t.gateway.handle(&request, &upstream).await.unwrap();
    assert!(response.is_granted());
    assert_eq!(response.body.as_deref(), Some(&b"speed=312"[..]));
    assert_eq!(upstream.forwarded.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn denied_requests_never_reach_upstream() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;
    t.enroll("c2").await;
    let upstream = RecordingUpstream::with("/files/c2/secret", b"nope");

    let request = t.signed_request("c1", "c1", "/files/c2/secret").await;
    let response = t.gateway.handle(&request, &upstream).await.unwrap();
    assert_eq!(response.decision.reason, Some(DenyReason::AccessDenied));
    assert_eq!(response.body, None);
    assert_eq!(upstream.forwarded.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upstream_errors_surface_after_grant() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;
    let upstream = RecordingUpstream::default();

    let request = t.signed_request("c1", "c1", "/files/c1/missing").await;
    let err = t.gateway.handle(&request, &upstream).await.unwrap_err();
    assert!(err.is_not_found());
    // The access itself was granted and counted
    assert_eq!(t.gateway.registry().get(&id("c1")).await.unwrap().request_count(), 1);
}

#[tokio::test]
async fn every_decision_is_audited() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;
    t.enroll("c2").await;

    let ok = t.signed_request("c1", "c1", "/telemetry/c1_data").await;
    let forged = t.signed_request("c1", "c2", "/telemetry/c1_data").await;
    let other = t.signed_request("c2", "c2", "/telemetry/c2_data").await;
    t.gateway.authorize(&ok).await;
    t.gateway.authorize(&forged).await;
    t.gateway.authorize(&other).await;

    let recent = t.gateway.events(2).await;
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].client_id, id("c2"));

    let c1 = t.gateway.events_for(&id("c1")).await;
    assert_eq!(c1.len(), 2);
    assert!(c1[0].decision.granted);
    assert_eq!(c1[1].decision.reason, Some(DenyReason::SignatureMismatch));
    assert_eq!(c1[0].endpoint, "/telemetry/c1_data");
    assert_eq!(c1[0].nonce_fingerprint, ok.nonce.fingerprint());
    assert!(!c1[0].nonce_fingerprint.contains(&ok.nonce.to_hex()));
}

#[tokio::test]
async fn audit_eviction_is_counted() {
    let t = TestGateway::with_config(GatewayConfig::default().with_audit_capacity(2)).await;
    t.enroll("c1").await;
    for _ in 0..3 {
        t.gateway.test_connection(&id("c1")).await.unwrap();
    }
    assert_eq!(t.gateway.events(10).await.len(), 2);
    let stats = t.gateway.stats().await;
    assert_eq!(stats.evicted_events, 1);
    assert_eq!(stats.granted, 3);
}

#[tokio::test]
async fn list_clients_is_ordered_projection() {
    let t = TestGateway::new().await;
    for client in ["zeta", "alpha", "mid"] {
        t.enroll(client).await;
    }
    t.gateway.revoke_access(&id("mid")).await.unwrap();
    t.gateway.test_connection(&id("alpha")).await.unwrap();

    let clients = t.gateway.list_clients().await;
    let ids: Vec<&str> = clients.iter().map(|c| c.client_id.as_str()).collect();
    assert_eq!(ids, vec!["alpha", "mid", "zeta"]);

    assert_eq!(clients[0].request_count, 1);
    assert!(clients[0].last_access_at.is_some());
    assert_eq!(clients[1].status, AccessStatus::Revoked);
    assert_eq!(clients[2].request_count, 0);
    assert_eq!(clients[2].last_access_at, None);
    assert_eq!(clients[2].endpoints.len(), 2);
}

#[tokio::test]
async fn duplicate_enrollment_is_rejected() {
    let t = TestGateway::new().await;
    let first = t.enroll("c1").await;
    let err = t
        .gateway
        .enroll(&id("c1"), patterns("/other"))
        .await
        .unwrap_err();
    assert!(err.is_duplicate_client());

    let identity = t.gateway.keystore().identity(&id("c1")).await.unwrap();
    assert_eq!(identity, first);
    assert!(!t.gateway.registry().is_authorized(&id("c1"), "/other").await);
}

#[tokio::test]
async fn challenges_require_enrollment() {
    let t = TestGateway::new().await;
    let err = t.gateway.issue_challenge(&id("ghost")).await.unwrap_err();
    assert!(err.is_unknown_client());
    assert!(err.is_challenge_error());
}

#[tokio::test]
async fn pending_challenge_limit_applies() {
    let t =
        TestGateway::with_config(GatewayConfig::default().with_max_pending_challenges(3)).await;
    t.enroll("c1").await;
    for _ in 0..3 {
        t.challenge("c1").await;
    }
    let err = t.gateway.issue_challenge(&id("c1")).await.unwrap_err();
    assert!(err.is_challenge_error());

    t.clock.advance(t.gateway.config().challenge_ttl.as_millis() as u64 + 1);
    assert_eq!(t.gateway.purge_expired_challenges().await, 3);
    t.challenge("c1").await;
}

#[tokio::test]
async fn provisioned_signer_completes_handshake() {
    let t = TestGateway::new().await;
    let identity = t.enroll("c1").await;

    let bundle = t.gateway.export_key(&id("c1"), "hunter2").await.unwrap();
    let json = serde_json::to_string(&bundle).unwrap();
    assert!(!json.contains("hunter2"));

    let signer = ClientSigner::from_bundle_json(id("c1"), &json, "hunter2").unwrap();
    assert_eq!(signer.address(), identity.address);

    let challenge = t.challenge("c1").await;
    let request = signer.sign_request(challenge.nonce, "/files/c1/latest_update");
    assert!(t.gateway.authorize(&request).await.granted);
}

#[tokio::test]
async fn invalid_client_ids_are_rejected() {
    let long = "x".repeat(65);
    for bad in ["", "has space", "slash/y", long.as_str()] {
        let err = ClientId::new(bad).unwrap_err();
        assert!(err.to_string().contains("Invalid client id"), "{bad}");
    }
}
