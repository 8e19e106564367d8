use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tower_http::services::ServeDir;
use tracing::info;

use crate::admission::AdmissionController;
use crate::guest::{FingerprintRegistry, GuestStore, ProviderKind};
use crate::identity::IdentityProvider;
use crate::notifications::{PrequeueNotifier, SlackNotifier};
use crate::prequeue::PrequeueWorkflow;
use crate::spotify::{PlaybackGateway, SpotifyClient};

use super::state::ServerState;
use super::{
    admin_routes, config_routes, connect_routes, fingerprint_routes, identity_routes,
    log_requests, prequeue_routes, queue_routes, slack_routes, ServerConfig,
};

#[derive(Serialize)]
struct ServerStats {
    uptime: String,
    hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    };
    Json(stats)
}

/// Everything the router needs injected. Tests swap in mock gateways and
/// notifiers here.
pub struct AppDeps {
    pub store: Arc<dyn GuestStore>,
    pub gateway: Arc<dyn PlaybackGateway>,
    pub notifier: Arc<dyn PrequeueNotifier>,
    pub spotify: Option<Arc<SpotifyClient>>,
    pub slack: Option<Arc<SlackNotifier>>,
    pub providers: Vec<Arc<dyn IdentityProvider>>,
}

pub fn make_app(config: ServerConfig, deps: AppDeps) -> Router {
    let registry = Arc::new(FingerprintRegistry::new(deps.store.clone()));
    let admission = Arc::new(AdmissionController::new(
        deps.store.clone(),
        deps.gateway.clone(),
    ));
    let prequeue = Arc::new(PrequeueWorkflow::new(
        deps.store.clone(),
        deps.gateway.clone(),
        deps.notifier.clone(),
    ));

    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        hash: env!("GIT_HASH").to_string(),
        store: deps.store,
        gateway: deps.gateway,
        registry,
        admission,
        prequeue,
        spotify: deps.spotify,
        slack: deps.slack,
        providers: Arc::new(deps.providers),
    };

    let api: Router<ServerState> = Router::new()
        .nest("/fingerprint", fingerprint_routes::routes())
        .nest("/queue", queue_routes::routes())
        .nest("/prequeue", prequeue_routes::routes())
        .nest("/now-playing", queue_routes::now_playing_routes())
        .nest("/admin", admin_routes::routes())
        .nest("/config", config_routes::routes())
        .nest("/auth", connect_routes::routes())
        .nest("/github", identity_routes::routes(ProviderKind::Github))
        .nest("/hackclub", identity_routes::routes(ProviderKind::Hackclub))
        .nest("/slack", slack_routes::routes());

    // With a frontend bundle configured, the root serves the SPA; otherwise a
    // small stats endpoint answers there.
    let home_router: Router<ServerState> = match &config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new().route("/", get(home)),
    };

    home_router
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

pub async fn run_server(config: ServerConfig, deps: AppDeps) -> Result<()> {
    let port = config.port;
    let app = make_app(config, deps);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!("Ready to serve at port {port}!");

    // ConnectInfo is needed by the IP-keyed search rate limiter.
    Ok(axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(61)), "0d 00:01:01");
        assert_eq!(
            format_uptime(Duration::from_secs(2 * 86_400 + 3 * 3600 + 4 * 60 + 5)),
            "2d 03:04:05"
        );
    }
}
