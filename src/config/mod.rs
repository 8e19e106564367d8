mod file_config;

pub use file_config::{FileConfig, OAuthConfig, SlackConfig, SpotifyConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{anyhow, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that participate in config resolution. TOML values override
/// CLI values where present; external-service credentials come from the TOML
/// file or, failing that, the environment.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub client_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CredentialPair {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SpotifySettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SlackSettings {
    pub webhook_url: Option<String>,
    pub prequeue_notifications: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub client_url: String,

    pub spotify: SpotifySettings,
    pub slack: SlackSettings,
    pub github: CredentialPair,
    pub hackclub: CredentialPair,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_var_either(primary: &str, fallback: &str) -> Option<String> {
    env_var(primary).or_else(|| env_var(fallback))
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

impl AppConfig {
    /// Resolve configuration from CLI arguments, an optional TOML file, and
    /// the environment (credentials only). TOML wins over CLI; TOML wins
    /// over environment for credentials.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| anyhow!("db_path must be specified via CLI or in the config file"))?;

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());
        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());
        let client_url = file
            .client_url
            .or_else(|| cli.client_url.clone())
            .or_else(|| env_var("CLIENT_URL"))
            .unwrap_or_else(|| "http://localhost:3000".to_string());

        let spotify_file = file.spotify.unwrap_or_default();
        let spotify = SpotifySettings {
            client_id: spotify_file.client_id.or_else(|| env_var("SPOTIFY_CLIENT_ID")),
            client_secret: spotify_file
                .client_secret
                .or_else(|| env_var("SPOTIFY_CLIENT_SECRET")),
            refresh_token: spotify_file
                .refresh_token
                .or_else(|| env_var("SPOTIFY_REFRESH_TOKEN")),
            redirect_uri: spotify_file
                .redirect_uri
                .or_else(|| env_var("SPOTIFY_REDIRECT_URI")),
        };

        let slack_file = file.slack.unwrap_or_default();
        let slack = SlackSettings {
            webhook_url: slack_file.webhook_url.or_else(|| env_var("SLACK_WEBHOOK_URL")),
            prequeue_notifications: slack_file.prequeue_notifications.unwrap_or_else(|| {
                env_var("SLACK_PREQUEUE_ENABLED").as_deref() == Some("true")
            }),
        };

        let github_file = file.github.unwrap_or_default();
        let github = CredentialPair {
            client_id: github_file.client_id.or_else(|| env_var("GITHUB_CLIENT_ID")),
            client_secret: github_file
                .client_secret
                .or_else(|| env_var("GITHUB_CLIENT_SECRET")),
            redirect_uri: github_file
                .redirect_uri
                .or_else(|| env_var("GITHUB_REDIRECT_URI")),
        };

        let hackclub_file = file.hackclub.unwrap_or_default();
        let hackclub = CredentialPair {
            client_id: hackclub_file
                .client_id
                .or_else(|| env_var_either("HACKCLUB_CLIENT_ID", "HC_CLIENT_ID")),
            client_secret: hackclub_file
                .client_secret
                .or_else(|| env_var_either("HACKCLUB_CLIENT_SECRET", "HC_CLIENT_SECRET")),
            redirect_uri: hackclub_file
                .redirect_uri
                .or_else(|| env_var_either("HACKCLUB_REDIRECT_URI", "HC_REDIRECT_URI")),
        };

        Ok(Self {
            db_path,
            port,
            metrics_port,
            logging_level,
            frontend_dir_path,
            client_url,
            spotify,
            slack,
            github,
            hackclub,
        })
    }

    /// Default provider callback route on this service, used when no
    /// explicit redirect URI is configured.
    pub fn provider_redirect_uri(&self, provider_path: &str, explicit: Option<&str>) -> String {
        match explicit {
            Some(uri) => uri.to_string(),
            None => format!(
                "{}/api/{}/callback",
                self.client_url.trim_end_matches('/'),
                provider_path
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with_db() -> CliConfig {
        CliConfig {
            db_path: Some(PathBuf::from("/cli/queue.db")),
            port: 8000,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Path,
            frontend_dir_path: None,
            client_url: None,
        }
    }

    #[test]
    fn test_resolve_cli_only() {
        let config = AppConfig::resolve(&cli_with_db(), None).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/cli/queue.db"));
        assert_eq!(config.port, 8000);
        assert_eq!(config.metrics_port, 9091);
    }

    #[test]
    fn test_resolve_missing_db_path_error() {
        let cli = CliConfig::default();
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("db_path must be specified"));
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let file = FileConfig {
            db_path: Some("/toml/queue.db".to_string()),
            port: Some(4000),
            logging_level: Some("headers".to_string()),
            client_url: Some("https://party.example".to_string()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli_with_db(), Some(file)).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/toml/queue.db"));
        assert_eq!(config.port, 4000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Headers);
        assert_eq!(config.client_url, "https://party.example");
        // CLI value used when TOML doesn't specify.
        assert_eq!(config.metrics_port, 9091);
    }

    #[test]
    fn test_resolve_credentials_from_file() {
        let file = FileConfig {
            spotify: Some(SpotifyConfig {
                client_id: Some("sp-id".to_string()),
                client_secret: Some("sp-secret".to_string()),
                ..Default::default()
            }),
            slack: Some(SlackConfig {
                webhook_url: Some("https://hooks.slack.com/x".to_string()),
                prequeue_notifications: Some(true),
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli_with_db(), Some(file)).unwrap();
        assert_eq!(config.spotify.client_id, Some("sp-id".to_string()));
        assert!(config.slack.prequeue_notifications);
    }

    #[test]
    fn test_provider_redirect_uri() {
        let config = AppConfig::resolve(&cli_with_db(), None).unwrap();
        assert_eq!(
            config.provider_redirect_uri("github", None),
            "http://localhost:3000/api/github/callback"
        );
        assert_eq!(
            config.provider_redirect_uri("github", Some("https://x/cb")),
            "https://x/cb"
        );
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("PATH"),
            Some(RequestsLoggingLevel::Path)
        ));
        assert!(parse_logging_level("bogus").is_none());
    }
}
