use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,
    pub client_url: Option<String>,

    // External service credentials (override the environment)
    pub spotify: Option<SpotifyConfig>,
    pub slack: Option<SlackConfig>,
    pub github: Option<OAuthConfig>,
    pub hackclub: Option<OAuthConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SlackConfig {
    pub webhook_url: Option<String>,
    pub prequeue_notifications: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: FileConfig = toml::from_str(
            r#"
            db_path = "/data/queue.db"
            port = 8080
            logging_level = "headers"
            client_url = "https://party.example"

            [spotify]
            client_id = "spotify-id"
            client_secret = "spotify-secret"

            [slack]
            webhook_url = "https://hooks.slack.com/services/x"
            prequeue_notifications = true

            [github]
            client_id = "gh-id"
            client_secret = "gh-secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, Some("/data/queue.db".to_string()));
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.logging_level, Some("headers".to_string()));
        let spotify = config.spotify.unwrap();
        assert_eq!(spotify.client_id, Some("spotify-id".to_string()));
        let slack = config.slack.unwrap();
        assert_eq!(slack.prequeue_notifications, Some(true));
        assert!(config.hackclub.is_none());
    }

    #[test]
    fn test_parse_empty_config() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.db_path.is_none());
        assert!(config.spotify.is_none());
    }

    #[test]
    fn test_unknown_keys_are_tolerated() {
        let config: FileConfig = toml::from_str("future_setting = true").unwrap();
        assert!(config.port.is_none());
    }
}
