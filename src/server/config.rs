use super::RequestsLoggingLevel;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Static frontend bundle to serve at the root, if any.
    pub frontend_dir_path: Option<String>,
    /// Where guest-facing redirects (OAuth returns) land.
    pub client_url: String,
    /// Redirect URI registered with Spotify for the account-connect flow.
    /// Defaults to this server's own callback route.
    pub spotify_redirect_uri: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 8000,
            frontend_dir_path: None,
            client_url: "http://localhost:3000".to_string(),
            spotify_redirect_uri: None,
        }
    }
}

impl ServerConfig {
    /// The effective Spotify OAuth redirect URI. Spotify no longer accepts
    /// plain "localhost", so the default uses 127.0.0.1.
    pub fn spotify_redirect_uri(&self) -> String {
        self.spotify_redirect_uri.clone().unwrap_or_else(|| {
            format!("http://127.0.0.1:{}/api/auth/callback", self.port)
        })
    }
}
