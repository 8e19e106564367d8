use super::extract::{error_json, AdminAuth};
use super::state::ServerState;
use crate::guest::GuestStore;
use crate::settings::PUBLIC_CONFIG_KEYS;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

pub fn routes() -> Router<ServerState> {
    Router::new()
        .route("/public/{key}", get(get_public))
        .route("/", get(get_all))
        .route("/", put(put_bulk))
        .route("/{key}", get(get_one))
        .route("/{key}", put(put_one))
}

fn internal(err: anyhow::Error) -> Response {
    error!("Config operation failed: {err}");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

/// Unauthenticated read, restricted to the whitelisted feature toggles the
/// guest UI needs. Passwords and tokens are never served here.
async fn get_public(State(state): State<ServerState>, Path(key): Path<String>) -> Response {
    if !PUBLIC_CONFIG_KEYS.contains(&key.as_str()) {
        return error_json(StatusCode::FORBIDDEN, "Config key is not public");
    }

    match state.store.get_config(&key) {
        Ok(Some(value)) => Json(json!({ "key": key, "value": value })).into_response(),
        Ok(None) => error_json(StatusCode::NOT_FOUND, "Config key not found"),
        Err(err) => internal(err),
    }
}

async fn get_all(State(state): State<ServerState>, _admin: AdminAuth) -> Response {
    match state.store.all_config() {
        Ok(entries) => {
            let config: serde_json::Map<String, serde_json::Value> = entries
                .into_iter()
                .map(|entry| (entry.key, json!(entry.value)))
                .collect();
            Json(json!({ "config": config })).into_response()
        }
        Err(err) => internal(err),
    }
}

async fn get_one(
    State(state): State<ServerState>,
    _admin: AdminAuth,
    Path(key): Path<String>,
) -> Response {
    match state.store.get_config(&key) {
        Ok(Some(value)) => Json(json!({ "key": key, "value": value })).into_response(),
        Ok(None) => error_json(StatusCode::NOT_FOUND, "Config key not found"),
        Err(err) => internal(err),
    }
}

#[derive(Debug, Deserialize)]
struct PutBody {
    value: serde_json::Value,
}

fn value_to_config_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

async fn put_one(
    State(state): State<ServerState>,
    _admin: AdminAuth,
    Path(key): Path<String>,
    Json(body): Json<PutBody>,
) -> Response {
    let Some(value) = value_to_config_string(&body.value) else {
        return error_json(StatusCode::BAD_REQUEST, "Value required");
    };

    match state.store.set_config(&key, &value) {
        Ok(()) => {
            info!("Config {key} set to {value}");
            Json(json!({ "success": true, "key": key, "value": value })).into_response()
        }
        Err(err) => internal(err),
    }
}

async fn put_bulk(
    State(state): State<ServerState>,
    _admin: AdminAuth,
    Json(updates): Json<serde_json::Map<String, serde_json::Value>>,
) -> Response {
    for (key, value) in &updates {
        let Some(value) = value_to_config_string(value) else {
            return error_json(
                StatusCode::BAD_REQUEST,
                format!("Unsupported value for key {key}"),
            );
        };
        if let Err(err) = state.store.set_config(key, &value) {
            return internal(err);
        }
    }

    match state.store.all_config() {
        Ok(entries) => {
            let config: serde_json::Map<String, serde_json::Value> = entries
                .into_iter()
                .map(|entry| (entry.key, json!(entry.value)))
                .collect();
            Json(json!({ "success": true, "config": config })).into_response()
        }
        Err(err) => internal(err),
    }
}
