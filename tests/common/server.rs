//! Test server lifecycle management.
//!
//! Each test gets an isolated server on a random port with its own SQLite
//! database, a scripted gateway and a recording notifier.

use super::fixtures::{explicit_track, track, RecordingNotifier, ScriptedGateway};
use jukebox_server::guest::{GuestStore, SqliteGuestStore};
use jukebox_server::server::{make_app, AppDeps, RequestsLoggingLevel, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct TestServer {
    /// Base URL for making requests (e.g. "http://127.0.0.1:12345").
    pub base_url: String,
    pub port: u16,

    /// Direct handles for seeding and asserting against backend state.
    pub store: Arc<SqliteGuestStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub notifier: Arc<RecordingNotifier>,

    _temp_dir: TempDir,
    server_task: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}

impl TestServer {
    /// Spawns a server whose gateway knows tracks "t1".."t3" plus an
    /// explicit track "t-explicit".
    pub async fn spawn() -> Self {
        Self::spawn_with_tracks(vec![
            track("t1"),
            track("t2"),
            track("t3"),
            explicit_track("t-explicit"),
        ])
        .await
    }

    pub async fn spawn_with_tracks(
        tracks: Vec<jukebox_server::spotify::TrackMetadata>,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("queue.db");
        let store = Arc::new(SqliteGuestStore::new(&db_path).expect("Failed to open store"));

        let gateway = Arc::new(ScriptedGateway::with_tracks(tracks));
        let notifier = Arc::new(RecordingNotifier::default());

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port: 0,
            frontend_dir_path: None,
            client_url: "http://127.0.0.1:3000".to_string(),
            spotify_redirect_uri: None,
        };

        let app = make_app(
            config,
            AppDeps {
                store: store.clone(),
                gateway: gateway.clone(),
                notifier: notifier.clone(),
                spotify: None,
                slack: None,
                providers: Vec::new(),
            },
        );

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener.local_addr().expect("No local addr").port();

        let server_task = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Test server crashed");
        });

        TestServer {
            base_url: format!("http://127.0.0.1:{port}"),
            port,
            store,
            gateway,
            notifier,
            _temp_dir: temp_dir,
            server_task,
        }
    }

    /// Shortcut for flipping a config key directly in the store.
    pub fn set_config(&self, key: &str, value: &str) {
        self.store.set_config(key, value).expect("set_config failed");
    }
}
