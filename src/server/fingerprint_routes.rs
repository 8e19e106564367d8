use super::extract::{error_json, fingerprint_from, FINGERPRINT_COOKIE};
use super::state::ServerState;
use crate::guest::{
    Fingerprint, FingerprintResolution, FingerprintRegistry, GateEvaluation, GuestStore,
    ProviderKind,
};
use crate::settings::PolicySnapshot;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

const FINGERPRINT_COOKIE_DAYS: i64 = 365;

#[derive(Debug, Default, Deserialize)]
struct GenerateBody {
    username: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ValidateBody {
    fingerprint_id: Option<String>,
}

pub fn routes() -> Router<ServerState> {
    Router::new()
        .route("/generate", post(generate))
        .route("/validate", post(validate))
}

pub(super) fn fingerprint_cookie(token: &str) -> Cookie<'static> {
    Cookie::build((FINGERPRINT_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(FINGERPRINT_COOKIE_DAYS))
        .build()
}

fn gate_flags(gates: &GateEvaluation) -> serde_json::Value {
    let provider_flag = |kind: ProviderKind| {
        gates
            .provider(kind)
            .map(|g| (g.outstanding(), g.verified, g.configured))
            .unwrap_or((false, false, false))
    };
    let (github_needed, github_verified, github_configured) = provider_flag(ProviderKind::Github);
    let (hackclub_needed, hackclub_verified, hackclub_configured) =
        provider_flag(ProviderKind::Hackclub);

    json!({
        "requires_username": gates.requires_username,
        "requires_github_auth": github_needed,
        "requires_hackclub_auth": hackclub_needed,
        "github_authenticated": github_verified,
        "hackclub_authenticated": hackclub_verified,
        "github_oauth_configured": github_configured,
        "hackclub_oauth_configured": hackclub_configured,
    })
}

fn with_flags(mut base: serde_json::Value, gates: &GateEvaluation) -> serde_json::Value {
    if let (Some(base_map), serde_json::Value::Object(flags)) =
        (base.as_object_mut(), gate_flags(gates))
    {
        base_map.extend(flags);
    }
    base
}

/// Resolve-or-create: issues the durable token cookie and reports the gating
/// flags the guest UI needs to decide what to ask for next.
async fn generate(
    State(state): State<ServerState>,
    jar: CookieJar,
    Json(body): Json<GenerateBody>,
) -> Response {
    let policy = match PolicySnapshot::load(state.store.as_ref()) {
        Ok(policy) => policy,
        Err(err) => {
            error!("Failed to load policy: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let token = jar.get(FINGERPRINT_COOKIE).map(|c| c.value().to_string());
    let availability = state.provider_availability();
    let now = chrono::Utc::now().timestamp();

    let resolution = match state.registry.resolve_or_create(
        &policy,
        &availability,
        token.as_deref(),
        body.username.as_deref(),
        now,
    ) {
        Ok(resolution) => resolution,
        Err(err) => {
            error!("Fingerprint resolution failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match resolution {
        FingerprintResolution::NeedsUsername { gates } => (
            StatusCode::BAD_REQUEST,
            Json(with_flags(json!({ "error": "Username is required" }), &gates)),
        )
            .into_response(),
        FingerprintResolution::Ready { fingerprint, gates }
        | FingerprintResolution::NeedsVerification { fingerprint, gates } => {
            let response = with_flags(
                json!({
                    "fingerprint_id": fingerprint.id,
                    "username": fingerprint.username,
                }),
                &gates,
            );
            (jar.add(fingerprint_cookie(&fingerprint.id)), Json(response)).into_response()
        }
    }
}

/// Re-runs the gating chain for an existing token; the guest UI polls this
/// to know whether queueing is currently possible for this device.
async fn validate(
    State(state): State<ServerState>,
    jar: CookieJar,
    Json(body): Json<ValidateBody>,
) -> Response {
    let policy = match PolicySnapshot::load(state.store.as_ref()) {
        Ok(policy) => policy,
        Err(err) => {
            error!("Failed to load policy: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some(fingerprint_id) = fingerprint_from(&jar, body.fingerprint_id.as_deref()) else {
        return error_json(StatusCode::BAD_REQUEST, "No fingerprint provided");
    };

    let fingerprint: Option<Fingerprint> = match state.store.get_fingerprint(&fingerprint_id) {
        Ok(fingerprint) => fingerprint,
        Err(err) => {
            error!("Fingerprint lookup failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let Some(fingerprint) = fingerprint else {
        return error_json(StatusCode::BAD_REQUEST, "Invalid fingerprint");
    };

    let availability = state.provider_availability();
    let gates = FingerprintRegistry::evaluate_gates(
        &policy,
        &availability,
        Some(&fingerprint),
        None,
    );

    if gates.verification_outstanding() {
        let unconfigured = gates.unconfigured_required();
        if !unconfigured.is_empty() {
            let names = unconfigured
                .iter()
                .map(|p| p.display_name())
                .collect::<Vec<_>>()
                .join(" and ");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(with_flags(
                    json!({
                        "error": format!(
                            "{names} OAuth is not configured, but auth enforcement is enabled."
                        ),
                    }),
                    &gates,
                )),
            )
                .into_response();
        }

        let names = gates
            .missing_providers()
            .iter()
            .map(|p| p.display_name())
            .collect::<Vec<_>>()
            .join(" and ");
        return (
            StatusCode::UNAUTHORIZED,
            Json(with_flags(
                json!({ "error": format!("{names} authentication required.") }),
                &gates,
            )),
        )
            .into_response();
    }

    if gates.requires_username {
        return (
            StatusCode::BAD_REQUEST,
            Json(with_flags(json!({ "error": "Username is required" }), &gates)),
        )
            .into_response();
    }

    if fingerprint.is_blocked() {
        return error_json(
            StatusCode::FORBIDDEN,
            "Device is blocked from queueing songs.",
        );
    }

    let now = chrono::Utc::now().timestamp();
    if policy.fingerprinting_enabled {
        if let Some(remaining) = fingerprint.cooldown_remaining(now) {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Please wait before queueing another song!",
                    "cooldown_remaining": remaining,
                })),
            )
                .into_response();
        }
    }

    Json(with_flags(
        json!({ "valid": true, "fingerprint": fingerprint }),
        &gates,
    ))
    .into_response()
}
