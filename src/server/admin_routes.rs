use super::extract::{error_json, AdminAuth};
use super::state::ServerState;
use crate::guest::GuestStore;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

const DEFAULT_ACTIVITY_LIMIT: usize = 50;
const TOP_LIMIT: usize = 10;

pub fn routes() -> Router<ServerState> {
    Router::new()
        .route("/devices", get(list_devices))
        .route("/devices/{fingerprint_id}/block", post(set_blocked))
        .route(
            "/devices/{fingerprint_id}/reset-cooldown",
            post(reset_cooldown),
        )
        .route("/reset-cooldowns", post(reset_all_cooldowns))
        .route("/banned-tracks", get(list_banned))
        .route("/banned-tracks", post(add_banned))
        .route("/banned-tracks/{track_id}", delete(remove_banned))
        .route("/activity", get(activity))
        .route("/stats", get(stats))
        .route("/reset-data", post(reset_data))
}

fn internal(err: anyhow::Error) -> Response {
    error!("Admin operation failed: {err}");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

async fn list_devices(State(state): State<ServerState>, _admin: AdminAuth) -> Response {
    let devices = match state.store.list_devices() {
        Ok(devices) => devices,
        Err(err) => return internal(err),
    };

    let now = chrono::Utc::now().timestamp();
    let devices: Vec<serde_json::Value> = devices
        .into_iter()
        .map(|device| {
            let cooldown_remaining = device.fingerprint.cooldown_remaining(now);
            let mut value = serde_json::to_value(&device).unwrap_or_default();
            value["cooldown_remaining"] = json!(cooldown_remaining);
            value
        })
        .collect();

    Json(json!({ "devices": devices })).into_response()
}

#[derive(Debug, Deserialize)]
struct BlockBody {
    blocked: bool,
}

async fn set_blocked(
    State(state): State<ServerState>,
    _admin: AdminAuth,
    Path(fingerprint_id): Path<String>,
    Json(body): Json<BlockBody>,
) -> Response {
    match state.registry.set_blocked(&fingerprint_id, body.blocked) {
        Ok(true) => {
            info!(
                "Fingerprint {fingerprint_id} {}",
                if body.blocked { "blocked" } else { "unblocked" }
            );
            Json(json!({ "success": true, "blocked": body.blocked })).into_response()
        }
        Ok(false) => error_json(StatusCode::NOT_FOUND, "Unknown fingerprint"),
        Err(err) => internal(err),
    }
}

async fn reset_cooldown(
    State(state): State<ServerState>,
    _admin: AdminAuth,
    Path(fingerprint_id): Path<String>,
) -> Response {
    match state.registry.reset_cooldown(&fingerprint_id) {
        Ok(true) => Json(json!({ "success": true })).into_response(),
        Ok(false) => error_json(StatusCode::NOT_FOUND, "Unknown fingerprint"),
        Err(err) => internal(err),
    }
}

async fn reset_all_cooldowns(State(state): State<ServerState>, _admin: AdminAuth) -> Response {
    match state.registry.reset_all_cooldowns() {
        Ok(reset_count) => {
            info!("Reset {reset_count} cooldowns");
            Json(json!({ "success": true, "reset_count": reset_count })).into_response()
        }
        Err(err) => internal(err),
    }
}

async fn list_banned(State(state): State<ServerState>, _admin: AdminAuth) -> Response {
    match state.store.list_banned_tracks() {
        Ok(banned) => Json(json!({ "banned": banned })).into_response(),
        Err(err) => internal(err),
    }
}

#[derive(Debug, Deserialize)]
struct BanBody {
    track_id: String,
    artist_id: Option<String>,
    reason: Option<String>,
}

async fn add_banned(
    State(state): State<ServerState>,
    _admin: AdminAuth,
    Json(body): Json<BanBody>,
) -> Response {
    if body.track_id.trim().is_empty() {
        return error_json(StatusCode::BAD_REQUEST, "Track ID required");
    }

    match state.store.add_banned_track(
        body.track_id.trim(),
        body.artist_id.as_deref(),
        body.reason.as_deref(),
    ) {
        Ok(true) => Json(json!({ "success": true })).into_response(),
        Ok(false) => error_json(StatusCode::CONFLICT, "Track is already banned"),
        Err(err) => internal(err),
    }
}

async fn remove_banned(
    State(state): State<ServerState>,
    _admin: AdminAuth,
    Path(track_id): Path<String>,
) -> Response {
    match state.store.remove_banned_track(&track_id) {
        Ok(true) => Json(json!({ "success": true })).into_response(),
        Ok(false) => error_json(StatusCode::NOT_FOUND, "Track is not banned"),
        Err(err) => internal(err),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ActivityParams {
    limit: Option<usize>,
}

async fn activity(
    State(state): State<ServerState>,
    _admin: AdminAuth,
    Query(params): Query<ActivityParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT).min(500);
    match state.store.recent_activity(limit) {
        Ok(activity) => Json(json!({ "activity": activity })).into_response(),
        Err(err) => internal(err),
    }
}

async fn stats(State(state): State<ServerState>, _admin: AdminAuth) -> Response {
    let stats = match state.store.attempt_stats() {
        Ok(stats) => stats,
        Err(err) => return internal(err),
    };
    let top_tracks = match state.store.top_tracks(TOP_LIMIT) {
        Ok(tracks) => tracks,
        Err(err) => return internal(err),
    };
    let top_requesters = match state.store.top_requesters(TOP_LIMIT) {
        Ok(requesters) => requesters,
        Err(err) => return internal(err),
    };

    Json(json!({
        "stats": stats,
        "top_tracks": top_tracks,
        "top_requesters": top_requesters,
    }))
    .into_response()
}

/// Wipes fingerprints, attempts, prequeue entries and votes. Config and the
/// denylist survive so the event setup does not have to be redone.
async fn reset_data(State(state): State<ServerState>, _admin: AdminAuth) -> Response {
    match state.store.reset_guest_data() {
        Ok(()) => {
            info!("All guest data reset by admin");
            Json(json!({ "success": true })).into_response()
        }
        Err(err) => internal(err),
    }
}
