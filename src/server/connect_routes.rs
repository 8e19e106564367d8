//! Spotify account connection: the operator authorizes the service against
//! their Spotify account so enqueue/queue-read calls can use the user grant.
//! The refresh token obtained here is persisted in the config table and
//! pushed into the running client, so no restart is needed.

use super::extract::{error_json, AdminAuth};
use super::state::ServerState;
use crate::guest::GuestStore;
use crate::settings::keys;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

pub fn routes() -> Router<ServerState> {
    Router::new()
        .route("/authorize", get(authorize))
        .route("/callback", get(callback))
        .route("/status", get(status))
        .route("/disconnect", post(disconnect))
}

async fn authorize(State(state): State<ServerState>) -> Response {
    let Some(spotify) = state.spotify.as_ref() else {
        return error_json(StatusCode::BAD_REQUEST, "Spotify client not configured");
    };

    let redirect_uri = state.config.spotify_redirect_uri();
    match spotify.authorize_url(&redirect_uri) {
        Ok(auth_url) => Json(json!({
            "auth_url": auth_url,
            "redirect_uri": redirect_uri,
        }))
        .into_response(),
        Err(_) => error_json(StatusCode::BAD_REQUEST, "SPOTIFY_CLIENT_ID not configured"),
    }
}

#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

fn result_page(title: &str, body: &str, extra_link: Option<(&str, &str)>) -> Html<String> {
    let extra = extra_link
        .map(|(href, label)| format!("<p><a href=\"{href}\">{label}</a></p>"))
        .unwrap_or_default();
    Html(format!(
        "<html><head><title>{title}</title></head>\
         <body style=\"font-family: sans-serif; padding: 40px; text-align: center;\">\
         <h1>{title}</h1><p>{body}</p><p><a href=\"/\">Return to app</a></p>{extra}\
         </body></html>"
    ))
}

async fn callback(
    State(state): State<ServerState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(oauth_error) = params.error {
        return result_page("Authorization Failed", &format!("Error: {oauth_error}"), None)
            .into_response();
    }
    let Some(code) = params.code else {
        return result_page(
            "Authorization Failed",
            "No authorization code received.",
            None,
        )
        .into_response();
    };

    let Some(spotify) = state.spotify.as_ref() else {
        return result_page("Authorization Failed", "Spotify client not configured", None)
            .into_response();
    };

    let redirect_uri = state.config.spotify_redirect_uri();
    let refresh_token = match spotify.exchange_authorization_code(&code, &redirect_uri).await {
        Ok(token) => token,
        Err(err) => {
            error!("Spotify code exchange failed: {err}");
            return result_page("Authorization Failed", &format!("Error: {err}"), None)
                .into_response();
        }
    };

    // Persist so the connection survives restarts; push the flag so the
    // admin UI sees it immediately.
    if let Err(err) = state
        .store
        .set_config(keys::SPOTIFY_REFRESH_TOKEN, &refresh_token)
    {
        error!("Failed to persist refresh token: {err}");
    }
    if let Err(err) = state.store.set_config(keys::SPOTIFY_CONNECTED, "true") {
        error!("Failed to set connected flag: {err}");
    }

    info!("Spotify account connected");

    let admin_panel_url = state
        .store
        .get_config(keys::ADMIN_PANEL_URL)
        .ok()
        .flatten()
        .filter(|url| !url.trim().is_empty());
    let extra_link = admin_panel_url
        .as_deref()
        .map(|url| (url, "Go to Admin Panel"));

    result_page(
        "Authorization Successful",
        "Your Spotify account has been connected. No restart needed.",
        extra_link,
    )
    .into_response()
}

async fn status(State(state): State<ServerState>) -> Response {
    let (has_client_id, has_client_secret, has_refresh_token) = match state.spotify.as_ref() {
        Some(spotify) => {
            let credentials = spotify.credentials();
            (
                credentials.client_id.as_deref().is_some_and(|s| !s.is_empty()),
                credentials
                    .client_secret
                    .as_deref()
                    .is_some_and(|s| !s.is_empty()),
                spotify.has_refresh_token(),
            )
        }
        None => (false, false, false),
    };

    Json(json!({
        "connected": has_client_id && has_client_secret && has_refresh_token,
        "has_client_id": has_client_id,
        "has_client_secret": has_client_secret,
        "has_refresh_token": has_refresh_token,
    }))
    .into_response()
}

async fn disconnect(State(state): State<ServerState>, _admin: AdminAuth) -> Response {
    if let Some(spotify) = state.spotify.as_ref() {
        spotify.set_refresh_token(None);
    }
    if let Err(err) = state.store.set_config(keys::SPOTIFY_REFRESH_TOKEN, "") {
        error!("Failed to clear refresh token: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if let Err(err) = state.store.set_config(keys::SPOTIFY_CONNECTED, "false") {
        error!("Failed to clear connected flag: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    info!("Spotify account disconnected");
    Json(json!({
        "success": true,
        "message": "Spotify account disconnected successfully",
    }))
    .into_response()
}
