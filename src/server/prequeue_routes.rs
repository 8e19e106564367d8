use super::extract::{error_json, fingerprint_from, AdminAuth, GuestAccess};
use super::metrics::record_prequeue_transition;
use super::state::ServerState;
use crate::guest::GuestStore;
use crate::prequeue::PrequeueError;
use crate::settings::PolicySnapshot;
use crate::spotify::TrackRef;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

pub fn routes() -> Router<ServerState> {
    Router::new()
        .route("/submit", post(submit))
        .route("/approve/{prequeue_id}", post(approve))
        .route("/decline/{prequeue_id}", post(decline))
        .route("/status/{prequeue_id}", get(status))
        .route("/pending", get(pending))
}

pub(super) fn prequeue_error_response(err: PrequeueError) -> Response {
    let status = match &err {
        PrequeueError::ServiceDisabled => StatusCode::SERVICE_UNAVAILABLE,
        PrequeueError::UnknownDevice
        | PrequeueError::InvalidReference
        | PrequeueError::AlreadyProcessed => StatusCode::BAD_REQUEST,
        PrequeueError::TooLong { .. } => StatusCode::FORBIDDEN,
        PrequeueError::DuplicateInQueue | PrequeueError::DuplicatePending => StatusCode::CONFLICT,
        PrequeueError::NotFound => StatusCode::NOT_FOUND,
        PrequeueError::NoActiveDevice | PrequeueError::Upstream(_) => StatusCode::BAD_GATEWAY,
        PrequeueError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_json(status, err.to_string())
}

#[derive(Debug, Default, Deserialize)]
struct SubmitBody {
    fingerprint_id: Option<String>,
    #[serde(flatten)]
    track: TrackRef,
}

#[derive(Debug, Default, Deserialize)]
struct ResolveBody {
    approved_by: Option<String>,
}

async fn submit(
    State(state): State<ServerState>,
    _access: GuestAccess,
    jar: CookieJar,
    Json(body): Json<SubmitBody>,
) -> Response {
    let policy = match PolicySnapshot::load(state.store.as_ref()) {
        Ok(policy) => policy,
        Err(err) => {
            error!("Failed to load policy: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some(fingerprint_id) = fingerprint_from(&jar, body.fingerprint_id.as_deref()) else {
        return error_json(StatusCode::BAD_REQUEST, "Missing fingerprint");
    };

    let now = chrono::Utc::now().timestamp();
    match state
        .prequeue
        .submit(&policy, &fingerprint_id, &body.track, now)
        .await
    {
        Ok(submission) => {
            record_prequeue_transition("submitted");
            Json(json!({
                "success": true,
                "prequeue_id": submission.entry.id,
                "message": "Track submitted for approval",
            }))
            .into_response()
        }
        Err(err) => prequeue_error_response(err),
    }
}

async fn approve(
    State(state): State<ServerState>,
    _admin: AdminAuth,
    Path(prequeue_id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> Response {
    let approver = body
        .approved_by
        .unwrap_or_else(|| "admin".to_string());

    let now = chrono::Utc::now().timestamp();
    match state.prequeue.approve(&prequeue_id, &approver, now).await {
        Ok(entry) => {
            record_prequeue_transition("approved");
            Json(json!({
                "success": true,
                "message": format!("Approved: {}", entry.track_name),
            }))
            .into_response()
        }
        Err(err) => prequeue_error_response(err),
    }
}

async fn decline(
    State(state): State<ServerState>,
    _admin: AdminAuth,
    Path(prequeue_id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> Response {
    let approver = body
        .approved_by
        .unwrap_or_else(|| "admin".to_string());

    match state.prequeue.decline(&prequeue_id, &approver) {
        Ok(entry) => {
            record_prequeue_transition("declined");
            Json(json!({
                "success": true,
                "message": format!("Declined: {}", entry.track_name),
            }))
            .into_response()
        }
        Err(err) => prequeue_error_response(err),
    }
}

/// Open to guests: a submitter polls their own entry to learn its fate.
async fn status(State(state): State<ServerState>, Path(prequeue_id): Path<String>) -> Response {
    match state.store.get_prequeue(&prequeue_id) {
        Ok(Some(entry)) => Json(entry).into_response(),
        Ok(None) => error_json(StatusCode::NOT_FOUND, "Prequeue entry not found"),
        Err(err) => {
            error!("Prequeue lookup failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn pending(State(state): State<ServerState>, _admin: AdminAuth) -> Response {
    match state.store.pending_prequeue() {
        Ok(pending) => Json(json!({ "pending": pending })).into_response(),
        Err(err) => {
            error!("Pending prequeue listing failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
