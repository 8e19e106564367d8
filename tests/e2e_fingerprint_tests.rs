mod common;

use common::{TestClient, TestServer};
use jukebox_server::guest::GuestStore;
use serde_json::{json, Value};

#[tokio::test]
async fn generate_mints_token_and_sets_cookie() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    let response = client
        .post_json("/api/fingerprint/generate", &json!({}))
        .await;
    assert_eq!(response.status(), 200);

    let set_cookie = response
        .headers()
        .get("set-cookie")
        .expect("no cookie issued")
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("fingerprint_id="));
    assert!(set_cookie.contains("HttpOnly"));

    let body: Value = response.json().await.unwrap();
    let id = body["fingerprint_id"].as_str().unwrap();
    assert_eq!(id.len(), 32);
    assert!(body["username"].is_null());
    assert_eq!(body["requires_username"], json!(false));

    // The record exists server-side.
    assert!(server.store.get_fingerprint(id).unwrap().is_some());
}

#[tokio::test]
async fn generate_is_stable_across_requests() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    let first = client.register_fingerprint().await;
    let second = client.register_fingerprint().await;
    assert_eq!(first, second);

    // A fresh client (no cookie) gets a different token.
    let other = TestClient::new(&server.base_url);
    let third = other.register_fingerprint().await;
    assert_ne!(first, third);
}

#[tokio::test]
async fn generate_username_first_write_wins() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    let response = client
        .post_json("/api/fingerprint/generate", &json!({ "username": "alice" }))
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["username"], json!("alice"));

    let response = client
        .post_json("/api/fingerprint/generate", &json!({ "username": "mallory" }))
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["username"], json!("alice"));
}

#[tokio::test]
async fn generate_enforces_required_username() {
    let server = TestServer::spawn().await;
    server.set_config("require_username", "true");
    let client = TestClient::new(&server.base_url);

    let response = client
        .post_json("/api/fingerprint/generate", &json!({}))
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["requires_username"], json!(true));

    // Providing a username satisfies the gate.
    let response = client
        .post_json("/api/fingerprint/generate", &json!({ "username": "bob" }))
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn validate_reports_device_state() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    // Without any fingerprint: rejected.
    let response = client
        .post_json("/api/fingerprint/validate", &json!({}))
        .await;
    assert_eq!(response.status(), 400);

    // Unknown id: rejected.
    let response = client
        .post_json(
            "/api/fingerprint/validate",
            &json!({ "fingerprint_id": "does-not-exist" }),
        )
        .await;
    assert_eq!(response.status(), 400);

    let id = client.register_fingerprint().await;
    let response = client
        .post_json("/api/fingerprint/validate", &json!({}))
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["valid"], json!(true));
    assert_eq!(body["fingerprint"]["id"], json!(id));
}

#[tokio::test]
async fn validate_surfaces_block_and_cooldown() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);
    let id = client.register_fingerprint().await;

    let now = chrono::Utc::now().timestamp();
    server.store.set_cooldown(&id, Some(now + 120)).unwrap();
    let response = client
        .post_json("/api/fingerprint/validate", &json!({}))
        .await;
    assert_eq!(response.status(), 429);
    let body: Value = response.json().await.unwrap();
    let remaining = body["cooldown_remaining"].as_i64().unwrap();
    assert!(remaining > 0 && remaining <= 120);

    server.store.set_blocked(&id, true).unwrap();
    let response = client
        .post_json("/api/fingerprint/validate", &json!({}))
        .await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn validate_reports_unconfigured_required_provider() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);
    client.register_fingerprint().await;

    // Verification required but no provider is wired up: the client must be
    // able to tell "login required" apart from "login broken".
    server.set_config("require_github_auth", "true");

    let response = client
        .post_json("/api/fingerprint/validate", &json!({}))
        .await;
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["requires_github_auth"], json!(true));
    assert_eq!(body["github_oauth_configured"], json!(false));
}

#[tokio::test]
async fn verification_requirement_outranks_username() {
    let server = TestServer::spawn().await;
    server.set_config("require_username", "true");
    server.set_config("require_hackclub_auth", "true");
    let client = TestClient::new(&server.base_url);

    // Generate succeeds (creating the record for the OAuth callback to bind
    // to) and reports the verification gate, not the username gate.
    let response = client
        .post_json("/api/fingerprint/generate", &json!({}))
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["requires_hackclub_auth"], json!(true));
    assert_eq!(body["requires_username"], json!(false));
}
