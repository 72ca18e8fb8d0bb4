use std::time::Duration;

use telegate::{DenyReason, gateway::GatewayConfig, identity::Address};

use crate::helpers::{TestGateway, id};

#[tokio::test]
async fn rotate_returns_new_address_only() {
    let t = TestGateway::new().await;
    let before = t.enroll("c1").await;

    let address = t.gateway.rotate_keys(&id("c1")).await.unwrap();
    assert_ne!(address, before.address);

    let identity = t.gateway.keystore().identity(&id("c1")).await.unwrap();
    assert_eq!(identity.address, address);
    assert_eq!(Address::from_public_key(&identity.public_key), address);
    assert_eq!(t.gateway.client_by_address(&address).await, Some(id("c1")));
    assert_eq!(t.gateway.client_by_address(&before.address).await, None);
}

#[tokio::test]
async fn rotation_bumps_epoch_in_listing() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;
    for _ in 0..3 {
        t.gateway.rotate_keys(&id("c1")).await.unwrap();
    }
    let clients = t.gateway.list_clients().await;
    assert_eq!(clients[0].rotation_epoch, 3);
}

#[tokio::test]
async fn new_key_verifies_after_rotation() {
    let t = TestGateway::new().await;
    t.enroll("c1").await;
    t.gateway.rotate_keys(&id("c1")).await.unwrap();

    let request = t.signed_request("c1", "c1", "/telemetry/c1_data").await;
    assert!(t.gateway.authorize(&request).await.granted);
}

#[tokio::test]
async fn rotating_unknown_client_fails() {
    let t = TestGateway::new().await;
    let err = t.gateway.rotate_keys(&id("ghost")).await.unwrap_err();
    assert!(err.is_unknown_client());
}

#[tokio::test]
async fn grace_window_accepts_previous_key_until_it_closes() {
    let config = GatewayConfig::default()
        .with_rotation_grace(Duration::from_secs(10))
        .with_challenge_ttl(Duration::from_secs(60));
    let t = TestGateway::with_config(config).await;
    t.enroll("c1").await;

    let early = t.challenge("c1").await;
    let late = t.challenge("c1").await;
    let early = t.sign(early, "c1", "/telemetry/c1_data").await;
    let late = t.sign(late, "c1", "/telemetry/c1_data").await;
    t.gateway.rotate_keys(&id("c1")).await.unwrap();

    assert!(t.gateway.authorize(&early).await.granted);

    t.clock.advance(10_001);
    let decision = t.gateway.authorize(&late).await;
    assert_eq!(decision.reason, Some(DenyReason::SignatureMismatch));
}

#[tokio::test]
async fn only_the_immediately_previous_key_gets_grace() {
    let config = GatewayConfig::default().with_rotation_grace(Duration::from_secs(30));
    let t = TestGateway::with_config(config).await;
    t.enroll("c1").await;

    let request = t.signed_request("c1", "c1", "/telemetry/c1_data").await;
    t.gateway.rotate_keys(&id("c1")).await.unwrap();
    t.gateway.rotate_keys(&id("c1")).await.unwrap();

    let decision = t.gateway.authorize(&request).await;
    assert_eq!(decision.reason, Some(DenyReason::SignatureMismatch));
}
