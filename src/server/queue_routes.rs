use super::extract::{error_json, fingerprint_from, GuestAccess};
use super::metrics::record_admission_outcome;
use super::state::ServerState;
use crate::admission::AdmissionError;
use crate::guest::GuestStore;
use crate::settings::PolicySnapshot;
use crate::spotify::TrackRef;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::http_layers::search_rate_limit_layer;

pub fn routes() -> Router<ServerState> {
    let search_routes = search_rate_limit_layer(Router::new().route("/search", post(search)));

    Router::new()
        .route("/add", post(add))
        .route("/current", get(current))
        .route("/vote", post(vote))
        .route("/votes", get(votes))
        .merge(search_routes)
}

pub fn now_playing_routes() -> Router<ServerState> {
    Router::new().route("/", get(now_playing))
}

fn outcome_label(err: Option<&AdmissionError>) -> &'static str {
    match err {
        None => "success",
        Some(AdmissionError::ServiceDisabled) => "service_disabled",
        Some(AdmissionError::UnknownDevice) => "unknown_device",
        Some(AdmissionError::DeviceBlocked) => "device_blocked",
        Some(AdmissionError::CoolingDown { .. }) => "cooling_down",
        Some(AdmissionError::QuotaExceeded { .. }) => "quota_exceeded",
        Some(AdmissionError::InvalidReference) => "invalid_reference",
        Some(AdmissionError::TrackBanned) => "track_banned",
        Some(AdmissionError::ExplicitBlocked) => "explicit_blocked",
        Some(AdmissionError::TooLong { .. }) => "too_long",
        Some(AdmissionError::DuplicateInQueue) => "duplicate_in_queue",
        Some(AdmissionError::NoActiveDevice) => "no_active_device",
        Some(AdmissionError::Upstream(_)) => "upstream_failure",
        Some(AdmissionError::Internal(_)) => "internal_error",
    }
}

/// Stable HTTP mapping for admission rejections. Rate-limit rejections carry
/// a machine-readable countdown so clients can render it without polling.
fn admission_error_response(err: AdmissionError) -> Response {
    let status = match &err {
        AdmissionError::ServiceDisabled => StatusCode::SERVICE_UNAVAILABLE,
        AdmissionError::UnknownDevice | AdmissionError::InvalidReference => StatusCode::BAD_REQUEST,
        AdmissionError::DeviceBlocked
        | AdmissionError::TrackBanned
        | AdmissionError::ExplicitBlocked
        | AdmissionError::TooLong { .. } => StatusCode::FORBIDDEN,
        AdmissionError::CoolingDown { .. } | AdmissionError::QuotaExceeded { .. } => {
            StatusCode::TOO_MANY_REQUESTS
        }
        AdmissionError::DuplicateInQueue => StatusCode::CONFLICT,
        AdmissionError::NoActiveDevice | AdmissionError::Upstream(_) => StatusCode::BAD_GATEWAY,
        AdmissionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut body = json!({ "error": err.to_string() });
    if let Some(remaining) = err.cooldown_remaining() {
        body["cooldown_remaining"] = json!(remaining);
    }
    (status, Json(body)).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct SearchBody {
    query: Option<String>,
}

async fn search(State(state): State<ServerState>, Json(body): Json<SearchBody>) -> Response {
    let policy = match PolicySnapshot::load(state.store.as_ref()) {
        Ok(policy) => policy,
        Err(err) => {
            error!("Failed to load policy: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if !policy.queueing_enabled {
        return error_json(
            StatusCode::SERVICE_UNAVAILABLE,
            "Queueing is currently disabled.",
        );
    }

    let query = body
        .query
        .map(|q| q.trim().to_string())
        .unwrap_or_default();
    if query.is_empty() {
        return error_json(StatusCode::BAD_REQUEST, "Search query required");
    }

    match state.gateway.search(&query, 10).await {
        Ok(mut tracks) => {
            // Tracks the policy would reject anyway are not offered.
            if policy.ban_explicit {
                tracks.retain(|t| !t.explicit);
            }
            Json(json!({ "tracks": tracks })).into_response()
        }
        Err(err) => error_json(StatusCode::BAD_GATEWAY, err.to_string()),
    }
}

#[derive(Debug, Default, Deserialize)]
struct AddBody {
    fingerprint_id: Option<String>,
    #[serde(flatten)]
    track: TrackRef,
}

async fn add(
    State(state): State<ServerState>,
    _access: GuestAccess,
    jar: CookieJar,
    Json(body): Json<AddBody>,
) -> Response {
    let policy = match PolicySnapshot::load(state.store.as_ref()) {
        Ok(policy) => policy,
        Err(err) => {
            error!("Failed to load policy: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some(fingerprint_id) = fingerprint_from(&jar, body.fingerprint_id.as_deref()) else {
        return error_json(StatusCode::BAD_REQUEST, "Could not fingerprint your device.");
    };

    let now = chrono::Utc::now().timestamp();
    let result = state
        .admission
        .admit(&policy, &fingerprint_id, &body.track, now)
        .await;

    record_admission_outcome(outcome_label(result.as_ref().err()));

    match result {
        Ok(track) => Json(json!({
            "success": true,
            "message": format!("Queued: {} by {}", track.name, track.artists),
            "track": track,
        }))
        .into_response(),
        Err(err) => admission_error_response(err),
    }
}

async fn current(State(state): State<ServerState>) -> Response {
    match state.gateway.queue_snapshot().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => error_json(StatusCode::BAD_GATEWAY, err.to_string()),
    }
}

/// Degrades to `{"track": null}` on upstream trouble: the guest display
/// treats "nothing playing" and "cannot tell" the same way.
async fn now_playing(State(state): State<ServerState>) -> Response {
    match state.gateway.now_playing().await {
        Ok(track) => Json(json!({ "track": track })).into_response(),
        Err(err) => {
            error!("Now playing unavailable: {err}");
            Json(json!({ "track": null })).into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct VoteBody {
    fingerprint_id: Option<String>,
    track_id: Option<String>,
}

async fn vote(
    State(state): State<ServerState>,
    _access: GuestAccess,
    jar: CookieJar,
    Json(body): Json<VoteBody>,
) -> Response {
    let policy = match PolicySnapshot::load(state.store.as_ref()) {
        Ok(policy) => policy,
        Err(err) => {
            error!("Failed to load policy: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if !policy.voting_enabled {
        return error_json(
            StatusCode::SERVICE_UNAVAILABLE,
            "Voting is currently disabled.",
        );
    }

    let Some(fingerprint_id) = fingerprint_from(&jar, body.fingerprint_id.as_deref()) else {
        return error_json(StatusCode::BAD_REQUEST, "Could not fingerprint your device.");
    };
    let Some(track_id) = body.track_id.filter(|t| !t.trim().is_empty()) else {
        return error_json(StatusCode::BAD_REQUEST, "Track ID required");
    };

    let now = chrono::Utc::now().timestamp();
    match state.store.toggle_vote(&track_id, &fingerprint_id, now) {
        Ok(toggle) => Json(json!({
            "success": true,
            "voted": toggle.voted,
            "count": toggle.count,
        }))
        .into_response(),
        Err(err) => {
            error!("Vote toggle failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn votes(State(state): State<ServerState>, jar: CookieJar) -> Response {
    let counts = match state.store.vote_counts() {
        Ok(counts) => counts,
        Err(err) => {
            error!("Vote counts failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let my_votes = match fingerprint_from(&jar, None) {
        Some(fingerprint_id) => state
            .store
            .votes_by_fingerprint(&fingerprint_id)
            .unwrap_or_default(),
        None => Vec::new(),
    };

    let votes: serde_json::Map<String, serde_json::Value> = counts
        .into_iter()
        .map(|(track_id, count)| (track_id, json!(count)))
        .collect();

    Json(json!({ "votes": votes, "my_votes": my_votes })).into_response()
}
