mod common;

use std::time::Duration;

use common::{body_field, json, MockRelay};
use happy_auth::relay::{AUTH_PATH, REQUEST_STATUS_PATH, RESPONSE_PATH};
use happy_auth::{
    approve_connection, reauthenticate, refresh_token, CredentialStore, Method, MemoryStore,
    RelayClient,
};
use happy_core::AuthCredentials;
use happy_crypto::encoding::{from_base64, to_base64};
use happy_crypto::{decrypt_box, generate_box_keypair, verify_detached, MasterSecret, SigningKeyPair};
use serde_json::json;

const SECRET: [u8; 32] = [0x33; 32];

fn status_relay(status: &'static str, supports_v2: bool) -> std::sync::Arc<MockRelay> {
    MockRelay::new(move |req| {
        if req.path.starts_with(REQUEST_STATUS_PATH) {
            assert_eq!(req.method, Method::Get);
            json(200, json!({"status": status, "supportsV2": supports_v2}))
        } else {
            assert_eq!(req.path, RESPONSE_PATH);
            json(200, json!({"success": true}))
        }
    })
}

#[tokio::test]
async fn approval_not_found_never_posts_answer() {
    let relay = status_relay("not_found", true);
    let requester = generate_box_keypair();

    let err = approve_connection(
        &RelayClient::new(relay.clone()),
        "bearer",
        requester.public_key(),
        &to_base64(&SECRET),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), "NOT_FOUND");
    assert_eq!(relay.posts_to(RESPONSE_PATH), 0);
}

#[tokio::test]
async fn approval_already_authorized() {
    let relay = status_relay("authorized", false);
    let requester = generate_box_keypair();

    let err = approve_connection(
        &RelayClient::new(relay.clone()),
        "bearer",
        requester.public_key(),
        &to_base64(&SECRET),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), "ALREADY_AUTHORIZED");
    assert_eq!(relay.posts_to(RESPONSE_PATH), 0);
}

async fn approve_and_open(supports_v2: bool) -> Vec<u8> {
    let relay = status_relay("pending", supports_v2);
    let requester = generate_box_keypair();

    approve_connection(
        &RelayClient::new(relay.clone()),
        "bearer-123",
        requester.public_key(),
        &to_base64(&SECRET),
    )
    .await
    .unwrap();

    let posted: Vec<_> = relay
        .requests()
        .into_iter()
        .filter(|r| r.path == RESPONSE_PATH)
        .collect();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].bearer.as_deref(), Some("bearer-123"));
    assert_eq!(
        body_field(&posted[0], "publicKey"),
        to_base64(requester.public_key())
    );

    let sealed = from_base64(&body_field(&posted[0], "response")).unwrap();
    decrypt_box(&sealed, requester.secret_key()).expect("answer opens with requester key")
}

#[tokio::test]
async fn approval_v1_answer_is_raw_secret() {
    assert_eq!(approve_and_open(false).await, SECRET.to_vec());
}

#[tokio::test]
async fn approval_v2_answer_is_versioned() {
    let answer = approve_and_open(true).await;
    assert_eq!(answer.len(), 33);
    assert_eq!(answer[0], 0);
    assert_eq!(&answer[1..], &SECRET);
}

#[tokio::test]
async fn approval_http_failure_not_retried() {
    let relay = MockRelay::new(|req| {
        if req.path.starts_with(REQUEST_STATUS_PATH) {
            json(200, json!({"status": "pending", "supportsV2": true}))
        } else {
            json(500, json!({"error": "boom"}))
        }
    });
    let requester = generate_box_keypair();

    let err = approve_connection(
        &RelayClient::new(relay.clone()),
        "bearer",
        requester.public_key(),
        &to_base64(&SECRET),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), "HTTP_ERROR");
    assert_eq!(relay.posts_to(RESPONSE_PATH), 1);
}

#[tokio::test]
async fn approval_rejects_bad_secret_before_network() {
    let relay = status_relay("pending", true);
    let requester = generate_box_keypair();

    let err = approve_connection(
        &RelayClient::new(relay.clone()),
        "bearer",
        requester.public_key(),
        &to_base64(&[1u8; 16]),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), "INVALID_SECRET");
    assert!(relay.requests().is_empty());
}

fn signing_relay(token: &'static str) -> std::sync::Arc<MockRelay> {
    MockRelay::new(move |req| {
        assert_eq!(req.path, AUTH_PATH);
        let challenge = from_base64(&body_field(req, "challenge")).unwrap();
        let signature = from_base64(&body_field(req, "signature")).unwrap();
        let public_key: [u8; 32] = from_base64(&body_field(req, "publicKey"))
            .unwrap()
            .try_into()
            .unwrap();

        assert_eq!(challenge.len(), 32);
        if verify_detached(&public_key, &challenge, &signature) {
            json(200, json!({"success": true, "token": token}))
        } else {
            json(401, json!({"error": "bad signature"}))
        }
    })
}

#[tokio::test]
async fn refresh_signs_with_master_secret_identity() {
    let relay = signing_relay("fresh-token");
    let secret = MasterSecret::from_bytes(SECRET);

    let token = refresh_token(&RelayClient::new(relay.clone()), &secret).await;
    assert_eq!(token.as_deref(), Some("fresh-token"));

    let sent = &relay.requests()[0];
    assert_eq!(
        body_field(sent, "publicKey"),
        to_base64(&SigningKeyPair::from_seed(&SECRET).public_key())
    );
}

#[tokio::test]
async fn refresh_failure_is_none() {
    let relay = MockRelay::new(|_| json(401, json!({"error": "unknown key"})));
    let token = refresh_token(&RelayClient::new(relay), &MasterSecret::from_bytes(SECRET)).await;
    assert!(token.is_none());
}

#[tokio::test]
async fn reauthenticate_persists_new_token() {
    let relay = RelayClient::new(signing_relay("rotated"));
    let store = CredentialStore::new(MemoryStore::new());

    assert!(reauthenticate(&relay, &store, Duration::from_secs(60))
        .await
        .unwrap()
        .is_none());

    store
        .save_credentials(&AuthCredentials {
            token: "old".into(),
            secret: to_base64(&SECRET),
            expires_at: 0,
        })
        .await
        .unwrap();

    let refreshed = reauthenticate(&relay, &store, Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.token, "rotated");
    assert!(!refreshed.is_expired(happy_core::now_millis()));
    assert_eq!(store.load_credentials().await.unwrap(), Some(refreshed));
}
