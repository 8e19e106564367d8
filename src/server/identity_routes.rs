//! Guest identity verification routes: one login/callback/status trio per
//! provider, bound to the caller's fingerprint cookie. A CSRF state cookie
//! protects the callback leg.

use super::extract::{error_json, FINGERPRINT_COOKIE};
use super::fingerprint_routes::fingerprint_cookie;
use super::state::ServerState;
use crate::guest::{FingerprintRegistry, GuestStore, ProviderKind};
use crate::settings::PolicySnapshot;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

const STATE_COOKIE_MINUTES: i64 = 10;

pub fn routes(kind: ProviderKind) -> Router<ServerState> {
    Router::new()
        .route(
            "/login",
            get(move |state: State<ServerState>, jar: CookieJar| login(kind, state, jar)),
        )
        .route(
            "/callback",
            get(
                move |state: State<ServerState>, jar: CookieJar, query: Query<CallbackParams>| {
                    callback(kind, state, jar, query)
                },
            ),
        )
        .route(
            "/status",
            get(move |state: State<ServerState>| status(kind, state)),
        )
}

fn state_cookie_name(kind: ProviderKind) -> String {
    format!("{}_oauth_state", kind.as_str())
}

fn state_cookie(kind: ProviderKind, value: &str) -> Cookie<'static> {
    Cookie::build((state_cookie_name(kind), value.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(STATE_COOKIE_MINUTES))
        .build()
}

fn failure_redirect(state: &ServerState, kind: ProviderKind, detail: &str) -> Response {
    let url = format!(
        "{}/?error={}_auth_failed&error_detail={}",
        state.config.client_url.trim_end_matches('/'),
        kind.as_str(),
        urlencoding::encode(detail),
    );
    Redirect::temporary(&url).into_response()
}

async fn login(kind: ProviderKind, State(state): State<ServerState>, jar: CookieJar) -> Response {
    let Some(provider) = state.provider(kind).filter(|p| p.configured()) else {
        return error_json(
            StatusCode::BAD_REQUEST,
            format!("{} OAuth not configured", kind.display_name()),
        );
    };

    let csrf_state = FingerprintRegistry::mint_token();
    let auth_url = match provider.authorize_url(&csrf_state) {
        Ok(url) => url,
        Err(err) => {
            error!("Failed to build authorize URL: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    (
        jar.add(state_cookie(kind, &csrf_state)),
        Json(json!({ "auth_url": auth_url })),
    )
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn callback(
    kind: ProviderKind,
    State(state): State<ServerState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let stored_state = jar
        .get(&state_cookie_name(kind))
        .map(|c| c.value().to_string());
    let jar = jar.remove(Cookie::build((state_cookie_name(kind), "")).path("/").build());

    if params.state.is_none() || params.state != stored_state {
        warn!("{} callback state mismatch", kind.display_name());
        return (jar, failure_redirect(&state, kind, "state_mismatch")).into_response();
    }

    if let Some(oauth_error) = params.error {
        let detail = params.error_description.unwrap_or(oauth_error);
        return (jar, failure_redirect(&state, kind, &detail)).into_response();
    }

    let Some(code) = params.code else {
        return (
            jar,
            failure_redirect(&state, kind, "missing_authorization_code"),
        )
            .into_response();
    };

    let Some(provider) = state.provider(kind).filter(|p| p.configured()) else {
        return (jar, failure_redirect(&state, kind, "not_configured")).into_response();
    };

    let identity = match provider.exchange_code(&code).await {
        Ok(identity) => identity,
        Err(err) => {
            error!("{} code exchange failed: {err}", kind.display_name());
            return (jar, failure_redirect(&state, kind, "token_exchange_failed")).into_response();
        }
    };

    let fingerprint_id = jar
        .get(FINGERPRINT_COOKIE)
        .map(|c| c.value().to_string())
        .unwrap_or_else(FingerprintRegistry::mint_token);

    let now = chrono::Utc::now().timestamp();
    if let Err(err) = state.store.bind_identity(&fingerprint_id, &identity, now) {
        error!("Failed to bind {} identity: {err}", kind.display_name());
        return (jar, failure_redirect(&state, kind, "binding_failed")).into_response();
    }

    info!(
        "Bound {} identity {} to fingerprint {fingerprint_id}",
        kind.display_name(),
        identity.external_id
    );

    let success_url = format!(
        "{}/?{}_auth=success",
        state.config.client_url.trim_end_matches('/'),
        kind.as_str(),
    );
    (
        jar.add(fingerprint_cookie(&fingerprint_id)),
        Redirect::temporary(&success_url),
    )
        .into_response()
}

async fn status(kind: ProviderKind, State(state): State<ServerState>) -> Response {
    let configured = state.provider(kind).is_some_and(|p| p.configured());
    let enforced = PolicySnapshot::load(state.store.as_ref())
        .map(|policy| match kind {
            ProviderKind::Github => policy.require_github_auth,
            ProviderKind::Hackclub => policy.require_hackclub_auth,
        })
        .unwrap_or(false);

    Json(json!({ "configured": configured, "enforced": enforced })).into_response()
}
