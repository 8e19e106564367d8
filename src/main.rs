use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jukebox_server::config::{AppConfig, CliConfig, FileConfig};
use jukebox_server::guest::SqliteGuestStore;
use jukebox_server::identity::{GithubProvider, HackClubProvider, IdentityProvider, OAuthSettings};
use jukebox_server::notifications::{NoopNotifier, PrequeueNotifier, SlackNotifier};
use jukebox_server::server::{metrics, run_server, AppDeps, RequestsLoggingLevel, ServerConfig};
use jukebox_server::settings::keys;
use jukebox_server::spotify::{PlaybackGateway, SpotifyClient, SpotifyCredentials};
use jukebox_server::GuestStore;

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite queue database file (created if missing).
    pub db_path: Option<PathBuf>,

    /// Optional TOML config file; its values override CLI arguments.
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8000)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Public URL of the guest client, used for OAuth redirects.
    #[clap(long)]
    pub client_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db_path,
        port: cli_args.port,
        metrics_port: cli_args.metrics_port,
        logging_level: cli_args.logging_level,
        frontend_dir_path: cli_args.frontend_dir_path,
        client_url: cli_args.client_url,
    };
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening SQLite queue database at {:?}...", app_config.db_path);
    let store = Arc::new(SqliteGuestStore::new(&app_config.db_path)?);

    info!("Initializing metrics...");
    metrics::init_metrics();

    // A refresh token persisted by a previous account-connect wins over the
    // environment seed.
    let stored_refresh_token = store
        .get_config(keys::SPOTIFY_REFRESH_TOKEN)?
        .filter(|t| !t.trim().is_empty());
    let refresh_token = stored_refresh_token.or(app_config.spotify.refresh_token.clone());

    let credentials = SpotifyCredentials {
        client_id: app_config.spotify.client_id.clone(),
        client_secret: app_config.spotify.client_secret.clone(),
    };
    if !credentials.configured() {
        error!("Spotify credentials not configured; queueing will be unavailable");
    }
    let spotify = Arc::new(SpotifyClient::new(credentials, refresh_token));
    let gateway: Arc<dyn PlaybackGateway> = spotify.clone();

    let slack = Arc::new(SlackNotifier::new(
        app_config.slack.webhook_url.clone(),
        app_config.slack.prequeue_notifications,
    ));
    let notifier: Arc<dyn PrequeueNotifier> = if slack.configured() {
        info!("Slack prequeue notifications enabled");
        slack.clone()
    } else {
        Arc::new(NoopNotifier)
    };

    let mut providers: Vec<Arc<dyn IdentityProvider>> = Vec::new();
    let github = GithubProvider::new(OAuthSettings {
        client_id: app_config.github.client_id.clone(),
        client_secret: app_config.github.client_secret.clone(),
        redirect_uri: Some(
            app_config.provider_redirect_uri("github", app_config.github.redirect_uri.as_deref()),
        ),
    });
    if github.configured() {
        info!("GitHub guest verification configured");
    }
    providers.push(Arc::new(github));

    let hackclub = HackClubProvider::new(OAuthSettings {
        client_id: app_config.hackclub.client_id.clone(),
        client_secret: app_config.hackclub.client_secret.clone(),
        redirect_uri: Some(
            app_config
                .provider_redirect_uri("hackclub", app_config.hackclub.redirect_uri.as_deref()),
        ),
    });
    if hackclub.configured() {
        info!("Hack Club guest verification configured");
    }
    providers.push(Arc::new(hackclub));

    let metrics_port = app_config.metrics_port;
    tokio::spawn(async move {
        if let Err(err) = metrics::run_metrics_server(metrics_port).await {
            error!("Metrics server failed: {err}");
        }
    });

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        frontend_dir_path: app_config.frontend_dir_path.clone(),
        client_url: app_config.client_url.clone(),
        spotify_redirect_uri: app_config.spotify.redirect_uri.clone(),
    };

    run_server(
        server_config,
        AppDeps {
            store,
            gateway,
            notifier,
            spotify: Some(spotify),
            slack: Some(slack),
            providers,
        },
    )
    .await
}
