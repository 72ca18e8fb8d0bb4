//! Handshake guarantees and the end-to-end scenarios.

use std::sync::Arc;

use telegate::{DenyReason, registry::AccessStatus};

use crate::helpers::{TestGateway, id};

#[tokio::test]
async fn verify_with_pre_rotation_key_is_signature_mismatch() {
    let t = TestGateway::new().await;
    for client in ["c1", "c2", "c3"] {
        t.enroll(client).await;
    }

    for client in ["c1", "c2", "c3"] {
        let challenge = t.challenge(client).await;
        // Signed with the key as it was before rotation
        let stale = t
            .sign(challenge, client, &format!("/telemetry/{client}_data"))
            .await;
        t.gateway.rotate_keys(&id(client)).await.unwrap();

        let decision = t.gateway.authorize(&stale).await;
        assert_eq!(decision.reason, Some(DenyReason::SignatureMismatch), "{client}");
    }
}

#[tokio::test]
async fn second_consume_is_already_consumed() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;

    for _ in 0..5 {
        let challenge = t.challenge("c1").await;
        let issuer = t.gateway.issuer();
        issuer.consume(&id("c1"), &challenge.nonce).await.unwrap();
        let err = issuer.consume(&id("c1"), &challenge.nonce).await.unwrap_err();
        assert!(err.is_already_consumed());
    }
}

#[tokio::test]
async fn replayed_request_is_rejected() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;
    let request = t.signed_request("c1", "c1", "/telemetry/c1_data").await;

    assert!(t.gateway.authorize(&request).await.granted);
    let replay = t.gateway.authorize(&request).await;
    assert_eq!(replay.reason, Some(DenyReason::InvalidChallenge));
}

#[tokio::test]
async fn revoke_denies_signed_requests_in_flight() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;
    // Signed while still active, presented after revocation
    let request = t.signed_request("c1", "c1", "/telemetry/c1_data").await;
    t.gateway.revoke_access(&id("c1")).await.unwrap();

    let decision = t.gateway.authorize(&request).await;
    assert_eq!(decision.reason, Some(DenyReason::AccessDenied));
}

#[tokio::test]
async fn revoke_twice_is_revoke_once() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;
    t.gateway.revoke_access(&id("c1")).await.unwrap();
    let once = t.gateway.registry().get(&id("c1")).await.unwrap();

    t.clock.advance(1_000);
    t.gateway.revoke_access(&id("c1")).await.unwrap();
    let twice = t.gateway.registry().get(&id("c1")).await.unwrap();

    assert_eq!(once, twice);
    assert_eq!(twice.status(), AccessStatus::Revoked);
}

#[tokio::test]
async fn scenario_a_enroll_sign_verify_counts_access() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;
    assert_eq!(t.gateway.registry().get(&id("c1")).await.unwrap().request_count(), 0);

    let request = t.signed_request("c1", "c1", "/telemetry/c1_data").await;
    let decision = t.gateway.authorize(&request).await;

    assert!(decision.granted);
    assert_eq!(decision.reason, None);
    let record = t.gateway.registry().get(&id("c1")).await.unwrap();
    assert_eq!(record.request_count(), 1);
    assert_eq!(record.last_access_at(), Some(decision.decided_at));
}

#[tokio::test]
async fn scenario_b_expired_challenge() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;
    let challenge = t.challenge("c1").await;

    t.clock.set(challenge.expires_at + 1);
    let err = t
        .gateway
        .issuer()
        .consume(&id("c1"), &challenge.nonce)
        .await
        .unwrap_err();
    assert!(err.is_expired());
}

#[tokio::test]
async fn scenario_b_expired_request_is_invalid_challenge() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;
    let request = t.signed_request("c1", "c1", "/telemetry/c1_data").await;

    t.clock.advance(t.gateway.config().challenge_ttl.as_millis() as u64 + 1);
    let decision = t.gateway.authorize(&request).await;
    assert_eq!(decision.reason, Some(DenyReason::InvalidChallenge));
}

#[tokio::test]
async fn scenario_c_foreign_key_is_signature_mismatch() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;
    t.enroll("c2").await;

    let request = t.signed_request("c1", "c2", "/telemetry/c1_data").await;
    let decision = t.gateway.authorize(&request).await;
    assert_eq!(decision.reason, Some(DenyReason::SignatureMismatch));
    assert_eq!(t.gateway.registry().get(&id("c1")).await.unwrap().request_count(), 0);
}

#[tokio::test]
async fn scenario_d_revoked_client_with_valid_signature() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;
    t.gateway.revoke_access(&id("c1")).await.unwrap();

    let request = t.signed_request("c1", "c1", "/telemetry/c1_data").await;
    // The signature itself is good
    let key = t.gateway.keystore().public_key_of(&id("c1")).await.unwrap();
    key.verify(
        &telegate::crypto::challenge_message(request.nonce.as_bytes()),
        &request.signature,
    )
    .unwrap();

    let decision = t.gateway.authorize(&request).await;
    assert_eq!(decision.reason, Some(DenyReason::AccessDenied));
}

#[tokio::test]
async fn regrant_restores_access_after_revoke() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;
    t.gateway.revoke_access(&id("c1")).await.unwrap();
    t.gateway
        .grant_access(&id("c1"), crate::helpers::patterns("/telemetry/c1_data"))
        .await
        .unwrap();

    let request = t.signed_request("c1", "c1", "/telemetry/c1_data").await;
    assert!(t.gateway.authorize(&request).await.granted);
}

#[tokio::test]
async fn concurrent_presentations_of_one_nonce_grant_once() {
    let t = Arc::new(TestGateway::new().await);
    t.enroll("c1").await;
    let request = t.signed_request("c1", "c1", "/telemetry/c1_data").await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let t = t.clone();
        let request = request.clone();
        handles.push(tokio::spawn(async move {
            t.gateway.authorize(&request).await.granted
        }));
    }
    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 1);
    assert_eq!(t.gateway.registry().get(&id("c1")).await.unwrap().request_count(), 1);
}

#[tokio::test]
async fn clients_progress_independently() {
    let t = Arc::new(TestGateway::new().await);
    let clients: Vec<String> = (0..8).map(|i| format!("c{i}")).collect();
    for client in &clients {
        t.enroll(client).await;
    }

    let mut handles = Vec::new();
    for client in clients.clone() {
        let t = t.clone();
        handles.push(tokio::spawn(async move {
            let endpoint = format!("/files/{client}/latest_update");
            let request = t.signed_request(&client, &client, &endpoint).await;
            t.gateway.authorize(&request).await.granted
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }
    for client in &clients {
        let record = t.gateway.registry().get(&id(client)).await.unwrap();
        assert_eq!(record.request_count(), 1);
    }
}
