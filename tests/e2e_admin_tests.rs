mod common;

use common::{TestClient, TestServer};
use jukebox_server::guest::GuestStore;
use serde_json::{json, Value};

#[tokio::test]
async fn admin_endpoints_require_basic_auth() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    let response = client.get("/api/admin/devices").await;
    assert_eq!(response.status(), 401);
    assert!(response.headers().get("www-authenticate").is_some());

    // Wrong password.
    let response = client
        .http
        .get(format!("{}/api/admin/devices", server.base_url))
        .basic_auth("admin", Some("wrong"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // Seeded default password.
    let response = client.admin_get("/api/admin/devices").await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn admin_password_is_runtime_tunable() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);
    server.set_config("admin_password", "hunter2");

    // The old default stops working immediately.
    let response = client.admin_get("/api/admin/devices").await;
    assert_eq!(response.status(), 401);

    let response = client
        .http
        .get(format!("{}/api/admin/devices", server.base_url))
        .basic_auth("admin", Some("hunter2"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn device_listing_shows_attempts_and_cooldown() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);
    let fingerprint_id = client.register_fingerprint().await;

    client
        .post_json("/api/queue/add", &json!({ "track_id": "t1" }))
        .await;

    let response = client.admin_get("/api/admin/devices").await;
    let body: Value = response.json().await.unwrap();
    let devices = body["devices"].as_array().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["id"], json!(fingerprint_id));
    assert_eq!(devices[0]["successful_attempts"], json!(1));
    // Default policy arms the cooldown after one success.
    assert!(devices[0]["cooldown_remaining"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn block_and_unblock_device() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);
    let fingerprint_id = client.register_fingerprint().await;

    let response = client
        .admin_post(
            &format!("/api/admin/devices/{fingerprint_id}/block"),
            &json!({ "blocked": true }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let response = client
        .post_json("/api/queue/add", &json!({ "track_id": "t1" }))
        .await;
    assert_eq!(response.status(), 403);

    let response = client
        .admin_post(
            &format!("/api/admin/devices/{fingerprint_id}/block"),
            &json!({ "blocked": false }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let response = client
        .post_json("/api/queue/add", &json!({ "track_id": "t1" }))
        .await;
    assert_eq!(response.status(), 200);

    // Unknown device: 404.
    let response = client
        .admin_post("/api/admin/devices/ghost/block", &json!({ "blocked": true }))
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn cooldown_reset_lets_guest_queue_again() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);
    let fingerprint_id = client.register_fingerprint().await;

    client
        .post_json("/api/queue/add", &json!({ "track_id": "t1" }))
        .await;
    let response = client
        .post_json("/api/queue/add", &json!({ "track_id": "t2" }))
        .await;
    assert_eq!(response.status(), 429);

    let response = client
        .admin_post(
            &format!("/api/admin/devices/{fingerprint_id}/reset-cooldown"),
            &json!({}),
        )
        .await;
    assert_eq!(response.status(), 200);

    // The cooldown is cleared, but the quota pre-check still counts the
    // trailing-window success and re-arms it. This mirrors a direct attempt
    // right after an admin reset inside the window.
    let response = client
        .post_json("/api/queue/add", &json!({ "track_id": "t2" }))
        .await;
    assert_eq!(response.status(), 429);

    // Raising the quota makes the reset effective.
    server.set_config("songs_before_cooldown", "5");
    let response = client
        .admin_post(
            &format!("/api/admin/devices/{fingerprint_id}/reset-cooldown"),
            &json!({}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let response = client
        .post_json("/api/queue/add", &json!({ "track_id": "t2" }))
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn reset_all_cooldowns_reports_count() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);

    let now = chrono::Utc::now().timestamp();
    for i in 0..3 {
        let id = format!("fp-{i}");
        server.store.create_fingerprint(&id, None, now).unwrap();
        server.store.set_cooldown(&id, Some(now + 600)).unwrap();
    }

    let response = client
        .admin_post("/api/admin/reset-cooldowns", &json!({}))
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["reset_count"], json!(3));
}

#[tokio::test]
async fn banned_tracks_management() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);
    client.register_fingerprint().await;

    let response = client
        .admin_post(
            "/api/admin/banned-tracks",
            &json!({ "track_id": "t1", "reason": "overplayed" }),
        )
        .await;
    assert_eq!(response.status(), 200);

    // Double ban conflicts.
    let response = client
        .admin_post("/api/admin/banned-tracks", &json!({ "track_id": "t1" }))
        .await;
    assert_eq!(response.status(), 409);

    let response = client.admin_get("/api/admin/banned-tracks").await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["banned"][0]["track_id"], json!("t1"));
    assert_eq!(body["banned"][0]["reason"], json!("overplayed"));

    let response = client
        .post_json("/api/queue/add", &json!({ "track_id": "t1" }))
        .await;
    assert_eq!(response.status(), 403);

    let response = client.admin_delete("/api/admin/banned-tracks/t1").await;
    assert_eq!(response.status(), 200);
    let response = client
        .post_json("/api/queue/add", &json!({ "track_id": "t1" }))
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn activity_and_stats_projections() {
    let server = TestServer::spawn().await;
    server.set_config("songs_before_cooldown", "10");
    let client = TestClient::new(&server.base_url);
    client.register_fingerprint().await;

    client
        .post_json("/api/queue/add", &json!({ "track_id": "t1" }))
        .await;
    client
        .post_json("/api/queue/add", &json!({ "track_id": "t1" }))
        .await;
    server.store.add_banned_track("t2", None, None).unwrap();
    client
        .post_json("/api/queue/add", &json!({ "track_id": "t2" }))
        .await;

    let response = client.admin_get("/api/admin/activity?limit=2").await;
    let body: Value = response.json().await.unwrap();
    let activity = body["activity"].as_array().unwrap();
    assert_eq!(activity.len(), 2);
    // Newest first: the banned rejection.
    assert_eq!(activity[0]["status"], json!("banned"));

    let response = client.admin_get("/api/admin/stats").await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["stats"]["total_attempts"], json!(3));
    assert_eq!(body["stats"]["successes"], json!(2));
    assert_eq!(body["stats"]["banned"], json!(1));
    assert_eq!(body["stats"]["distinct_devices"], json!(1));
    assert_eq!(body["top_tracks"][0]["track_id"], json!("t1"));
    assert_eq!(body["top_tracks"][0]["count"], json!(2));
}

#[tokio::test]
async fn reset_data_wipes_guest_state() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server.base_url);
    let fingerprint_id = client.register_fingerprint().await;
    client
        .post_json("/api/queue/add", &json!({ "track_id": "t1" }))
        .await;
    server.set_config("cooldown_duration", "900");

    let response = client.admin_post("/api/admin/reset-data", &json!({})).await;
    assert_eq!(response.status(), 200);

    assert!(server.store.get_fingerprint(&fingerprint_id).unwrap().is_none());
    assert_eq!(server.store.attempt_stats().unwrap().total_attempts, 0);
    // Config survives.
    assert_eq!(
        server.store.get_config("cooldown_duration").unwrap(),
        Some("900".to_string())
    );
}
