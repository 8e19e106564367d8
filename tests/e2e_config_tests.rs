mod common;

use common::{TestClient, TestServer};
use jukebox_server::guest::GuestStore;
use serde_json::{json, Value};

#[tokio::test]
async fn public_keys_readable_without_auth() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    let response = client.get("/api/config/public/queueing_enabled").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["key"], json!("queueing_enabled"));
    assert_eq!(body["value"], json!("true"));
}

#[tokio::test]
async fn secrets_are_not_public() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    for key in ["admin_password", "user_password", "spotify_refresh_token"] {
        let response = client.get(&format!("/api/config/public/{key}")).await;
        assert_eq!(response.status(), 403, "{key} must not be public");
    }

    // Whitelisted but unset values are a plain 404.
    let response = client.get("/api/config/public/spotify_connected").await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn full_config_requires_admin() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    let response = client.get("/api/config").await;
    assert_eq!(response.status(), 401);

    let response = client.admin_get("/api/config").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["config"]["cooldown_duration"], json!("300"));
    assert_eq!(body["config"]["admin_password"], json!("admin"));
}

#[tokio::test]
async fn put_single_key_changes_behavior() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);
    client.register_fingerprint().await;

    let response = client
        .admin_put("/api/config/queueing_enabled", &json!({ "value": false }))
        .await;
    assert_eq!(response.status(), 200);

    // The toggle takes effect on the next request, no restart involved.
    let response = client
        .post_json("/api/queue/add", &json!({ "track_id": "t1" }))
        .await;
    assert_eq!(response.status(), 503);

    let response = client
        .admin_put("/api/config/queueing_enabled", &json!({ "value": "true" }))
        .await;
    assert_eq!(response.status(), 200);
    let response = client
        .post_json("/api/queue/add", &json!({ "track_id": "t1" }))
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn put_bulk_updates_multiple_keys() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    let response = client
        .admin_put(
            "/api/config",
            &json!({
                "cooldown_duration": 600,
                "songs_before_cooldown": "3",
                "ban_explicit": true,
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["config"]["cooldown_duration"], json!("600"));
    assert_eq!(body["config"]["songs_before_cooldown"], json!("3"));
    assert_eq!(body["config"]["ban_explicit"], json!("true"));

    assert_eq!(
        server.store.get_config("cooldown_duration").unwrap(),
        Some("600".to_string())
    );
}

#[tokio::test]
async fn put_rejects_unsupported_values() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    let response = client
        .admin_put("/api/config/cooldown_duration", &json!({ "value": [1, 2] }))
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn home_route_reports_stats() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    let response = client.get("/").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert!(body["uptime"].as_str().unwrap().contains("0d"));
    assert!(body["hash"].is_string());
}
