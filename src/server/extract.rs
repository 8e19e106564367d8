//! Request extractors: admin basic auth, the optional guest door password,
//! and the fingerprint cookie.

use super::state::ServerState;
use crate::settings::PolicySnapshot;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::json;

pub const FINGERPRINT_COOKIE: &str = "fingerprint_id";

pub fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Explicit (body/query) fingerprint wins over the cookie, as the original
/// clients may send either.
pub fn fingerprint_from(jar: &CookieJar, explicit: Option<&str>) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .or_else(|| jar.get(FINGERPRINT_COOKIE).map(|c| c.value().to_string()))
}

fn decode_basic_auth(parts: &Parts) -> Option<(String, String)> {
    let header_value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = header_value.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

fn challenge(realm: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, format!("Basic realm=\"{realm}\""))],
        Json(json!({ "error": "Authentication required" })),
    )
        .into_response()
}

/// Operator access, checked against the runtime-tunable admin password.
pub struct AdminAuth;

impl FromRequestParts<ServerState> for AdminAuth {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let policy = PolicySnapshot::load(state.store.as_ref())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())?;

        match decode_basic_auth(parts) {
            Some((user, password)) if user == "admin" && password == policy.admin_password => {
                Ok(AdminAuth)
            }
            _ => Err(challenge("Admin Area")),
        }
    }
}

/// The optional guest door password. When `user_password` is unset the
/// extractor is a no-op.
pub struct GuestAccess;

impl FromRequestParts<ServerState> for GuestAccess {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let policy = PolicySnapshot::load(state.store.as_ref())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())?;

        if !policy.user_password_required() {
            return Ok(GuestAccess);
        }

        match decode_basic_auth(parts) {
            Some((user, password)) if user == "user" && password == policy.user_password => {
                Ok(GuestAccess)
            }
            _ => Err(challenge("Queue Access")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn test_decode_basic_auth() {
        let encoded = BASE64.encode("admin:secret");
        let parts = parts_with_auth(Some(&format!("Basic {encoded}")));
        assert_eq!(
            decode_basic_auth(&parts),
            Some(("admin".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_decode_basic_auth_rejects_malformed() {
        assert_eq!(decode_basic_auth(&parts_with_auth(None)), None);
        assert_eq!(
            decode_basic_auth(&parts_with_auth(Some("Bearer token"))),
            None
        );
        assert_eq!(
            decode_basic_auth(&parts_with_auth(Some("Basic not-base64!!"))),
            None
        );
        let no_colon = BASE64.encode("admin");
        assert_eq!(
            decode_basic_auth(&parts_with_auth(Some(&format!("Basic {no_colon}")))),
            None
        );
    }

    #[test]
    fn test_password_with_colon_preserved() {
        let encoded = BASE64.encode("user:pa:ss");
        let parts = parts_with_auth(Some(&format!("Basic {encoded}")));
        assert_eq!(
            decode_basic_auth(&parts),
            Some(("user".to_string(), "pa:ss".to_string()))
        );
    }
}
