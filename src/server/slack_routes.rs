//! Inbound Slack interactivity: the approve/decline buttons attached to
//! prequeue notifications land here and converge on the same workflow
//! transitions as the admin UI.

use super::metrics::record_prequeue_transition;
use super::state::ServerState;
use crate::notifications::{InteractivePayload, PrequeueAction};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Form, Router,
};
use serde::Deserialize;
use tracing::{error, warn};

pub fn routes() -> Router<ServerState> {
    Router::new().route("/interactive", post(interactive))
}

#[derive(Debug, Deserialize)]
struct InteractiveForm {
    payload: String,
}

/// Slack posts interactive payloads as a form-encoded `payload` field and
/// expects a prompt 200; the human-visible result goes to `response_url`.
async fn interactive(
    State(state): State<ServerState>,
    Form(form): Form<InteractiveForm>,
) -> Response {
    let payload: InteractivePayload = match serde_json::from_str(&form.payload) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("Unparseable Slack payload: {err}");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let Some(action) = payload
        .actions
        .first()
        .and_then(|a| PrequeueAction::parse(&a.action_id))
    else {
        warn!("Slack payload carried no recognizable action");
        return StatusCode::OK.into_response();
    };

    let approver = payload
        .user
        .as_ref()
        .map(|u| u.display())
        .unwrap_or_else(|| "slack".to_string());
    let now = chrono::Utc::now().timestamp();

    let reply = match action {
        PrequeueAction::Approve(prequeue_id) => {
            match state.prequeue.approve(&prequeue_id, &approver, now).await {
                Ok(entry) => {
                    record_prequeue_transition("approved");
                    format!(
                        "Approved by {approver}: {} by {}",
                        entry.track_name, entry.artist_name
                    )
                }
                Err(err) => {
                    error!("Slack approve failed for {prequeue_id}: {err}");
                    format!("Error approving track: {err}")
                }
            }
        }
        PrequeueAction::Decline(prequeue_id) => {
            match state.prequeue.decline(&prequeue_id, &approver) {
                Ok(entry) => {
                    record_prequeue_transition("declined");
                    format!(
                        "Declined by {approver}: {} by {}",
                        entry.track_name, entry.artist_name
                    )
                }
                Err(err) => {
                    error!("Slack decline failed for {prequeue_id}: {err}");
                    format!("Error declining track: {err}")
                }
            }
        }
    };

    if let (Some(slack), Some(response_url)) = (&state.slack, payload.response_url.as_deref()) {
        slack.respond(response_url, &reply).await;
    }

    StatusCode::OK.into_response()
}
