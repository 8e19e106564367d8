//! Spotify Web API client implementing [`PlaybackGateway`].
//!
//! Holds the short-lived access token (refreshed via the refresh-token grant
//! when an account is connected, client-credentials otherwise) and the TTL'd
//! queue-snapshot cache.

use super::cache::{Clock, SystemClock, TtlCache};
use super::{GatewayError, NowPlaying, PlaybackGateway, QueueSnapshot, TrackMetadata};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

const API_BASE: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// How long a cached queue snapshot shields the upstream from polling load.
const SNAPSHOT_TTL_MS: u64 = 20_000;

/// Refresh the access token this many seconds before it actually expires.
const TOKEN_EXPIRY_SLACK_SECS: u64 = 60;

#[derive(Clone, Debug, Default)]
pub struct SpotifyCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl SpotifyCredentials {
    pub fn configured(&self) -> bool {
        self.client_id.as_deref().is_some_and(|s| !s.is_empty())
            && self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

struct CachedToken {
    access_token: String,
    expires_at: u64,
}

pub struct SpotifyClient {
    http: reqwest::Client,
    credentials: SpotifyCredentials,
    refresh_token: Mutex<Option<String>>,
    token: tokio::sync::Mutex<Option<CachedToken>>,
    snapshot_cache: TtlCache<QueueSnapshot>,
    clock: Arc<dyn Clock>,
}

impl SpotifyClient {
    pub fn new(credentials: SpotifyCredentials, refresh_token: Option<String>) -> Self {
        Self::with_clock(credentials, refresh_token, Arc::new(SystemClock))
    }

    pub fn with_clock(
        credentials: SpotifyCredentials,
        refresh_token: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build Spotify HTTP client");

        Self {
            http,
            credentials,
            refresh_token: Mutex::new(refresh_token.filter(|t| !t.trim().is_empty())),
            token: tokio::sync::Mutex::new(None),
            snapshot_cache: TtlCache::new(SNAPSHOT_TTL_MS, clock.clone()),
            clock,
        }
    }

    pub fn credentials(&self) -> &SpotifyCredentials {
        &self.credentials
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.lock().unwrap().is_some()
    }

    /// Swaps the refresh token (e.g. after an account connect/disconnect) and
    /// drops the cached access token so the next call uses the new grant.
    pub fn set_refresh_token(&self, token: Option<String>) {
        *self.refresh_token.lock().unwrap() = token.filter(|t| !t.trim().is_empty());
        if let Ok(mut cached) = self.token.try_lock() {
            *cached = None;
        }
    }

    async fn clear_token_cache(&self) {
        *self.token.lock().await = None;
    }

    /// Builds the user-authorization URL for connecting a Spotify account.
    pub fn authorize_url(&self, redirect_uri: &str) -> Result<String, GatewayError> {
        let client_id = self
            .credentials
            .client_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(GatewayError::NotConfigured)?;

        let scopes =
            "user-read-playback-state user-modify-playback-state user-read-currently-playing";
        Ok(format!(
            "https://accounts.spotify.com/authorize?client_id={}&response_type=code&redirect_uri={}&scope={}",
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(scopes),
        ))
    }

    /// Exchanges an authorization code for tokens, adopts them, and returns
    /// the refresh token for persistence.
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, GatewayError> {
        if !self.credentials.configured() {
            return Err(GatewayError::NotConfigured);
        }

        let client_id = self.credentials.client_id.as_deref().unwrap_or_default();
        let client_secret = self.credentials.client_secret.as_deref().unwrap_or_default();
        let basic = BASE64.encode(format!("{client_id}:{client_secret}"));

        let response = self
            .http
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {basic}"))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let message = body["error_description"]
                .as_str()
                .unwrap_or("authorization code exchange failed")
                .to_string();
            return Err(GatewayError::Auth(message));
        }

        #[derive(Deserialize)]
        struct CodeExchangeResponse {
            access_token: String,
            expires_in: u64,
            refresh_token: String,
        }

        let tokens: CodeExchangeResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        let now = self.clock.now_millis() / 1000;
        *self.refresh_token.lock().unwrap() = Some(tokens.refresh_token.clone());
        *self.token.lock().await = Some(CachedToken {
            access_token: tokens.access_token,
            expires_at: now + tokens.expires_in,
        });

        Ok(tokens.refresh_token)
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        if !self.credentials.configured() {
            return Err(GatewayError::NotConfigured);
        }

        let now = self.clock.now_millis() / 1000;
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > now + TOKEN_EXPIRY_SLACK_SECS {
                return Ok(token.access_token.clone());
            }
        }

        let client_id = self.credentials.client_id.as_deref().unwrap_or_default();
        let client_secret = self.credentials.client_secret.as_deref().unwrap_or_default();
        let refresh_token = self.refresh_token.lock().unwrap().clone();

        let response = match refresh_token {
            Some(refresh_token) => {
                let basic = BASE64.encode(format!("{client_id}:{client_secret}"));
                self.http
                    .post(TOKEN_URL)
                    .header("Authorization", format!("Basic {basic}"))
                    .form(&[
                        ("grant_type", "refresh_token"),
                        ("refresh_token", refresh_token.as_str()),
                    ])
                    .send()
                    .await
            }
            None => {
                self.http
                    .post(TOKEN_URL)
                    .form(&[
                        ("grant_type", "client_credentials"),
                        ("client_id", client_id),
                        ("client_secret", client_secret),
                    ])
                    .send()
                    .await
            }
        }
        .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let error = body["error"].as_str().unwrap_or_default();
            let message = match error {
                "invalid_client" => "invalid client id/secret".to_string(),
                "invalid_grant" => "refresh token rejected, reconnect the account".to_string(),
                _ => body["error_description"]
                    .as_str()
                    .unwrap_or("token request failed")
                    .to_string(),
            };
            return Err(GatewayError::Auth(message));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
            refresh_token: Option<String>,
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        // Spotify may rotate the refresh token on use.
        if let Some(rotated) = token.refresh_token {
            debug!("Spotify rotated the refresh token");
            *self.refresh_token.lock().unwrap() = Some(rotated);
        }

        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: now + token.expires_in,
        });
        Ok(access_token)
    }

    fn map_error_status(response: &reqwest::Response) -> Option<GatewayError> {
        let status = response.status();
        if status.is_success() {
            return None;
        }
        Some(match status.as_u16() {
            401 => GatewayError::Auth("access token rejected".to_string()),
            429 => {
                let retry_after_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5);
                GatewayError::RateLimited { retry_after_secs }
            }
            _ => GatewayError::Upstream(format!("Spotify returned {status}")),
        })
    }
}

// Wire types for the subset of the Spotify API surface this service reads.

#[derive(Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Deserialize)]
struct ApiImage {
    url: String,
}

#[derive(Deserialize)]
struct ApiAlbum {
    name: String,
    #[serde(default)]
    images: Vec<ApiImage>,
}

#[derive(Deserialize)]
struct ApiTrack {
    id: String,
    name: String,
    artists: Vec<ApiArtist>,
    album: ApiAlbum,
    duration_ms: u64,
    uri: String,
    #[serde(default)]
    explicit: bool,
}

impl From<ApiTrack> for TrackMetadata {
    fn from(track: ApiTrack) -> Self {
        let artists = track
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            id: track.id,
            name: track.name,
            artists,
            album: track.album.name,
            album_art: track.album.images.first().map(|i| i.url.clone()),
            duration_ms: track.duration_ms,
            uri: track.uri,
            explicit: track.explicit,
        }
    }
}

#[async_trait]
impl PlaybackGateway for SpotifyClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackMetadata>, GatewayError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .get(format!("{API_BASE}/search"))
            .query(&[
                ("q", query),
                ("type", "track"),
                ("limit", &limit.to_string()),
            ])
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        if let Some(err) = Self::map_error_status(&response) {
            return Err(err);
        }

        #[derive(Deserialize)]
        struct SearchTracks {
            items: Vec<ApiTrack>,
        }
        #[derive(Deserialize)]
        struct SearchResponse {
            tracks: SearchTracks,
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;
        Ok(body.tracks.items.into_iter().map(Into::into).collect())
    }

    async fn resolve(&self, track_id: &str) -> Result<TrackMetadata, GatewayError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .get(format!("{API_BASE}/tracks/{track_id}"))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        // An id Spotify does not recognize is the caller's problem, not an
        // upstream outage.
        if matches!(response.status().as_u16(), 400 | 404) {
            return Err(GatewayError::InvalidTrack);
        }
        if let Some(err) = Self::map_error_status(&response) {
            return Err(err);
        }

        let track: ApiTrack = response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;
        Ok(track.into())
    }

    async fn enqueue(&self, track_uri: &str) -> Result<(), GatewayError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .post(format!("{API_BASE}/me/player/queue"))
            .query(&[("uri", track_uri)])
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Err(GatewayError::NoActiveDevice);
        }
        if let Some(err) = Self::map_error_status(&response) {
            return Err(err);
        }

        // The submitter should see their own track on the next poll.
        self.snapshot_cache.invalidate();
        Ok(())
    }

    async fn queue_snapshot(&self) -> Result<QueueSnapshot, GatewayError> {
        if let Some(snapshot) = self.snapshot_cache.get() {
            return Ok(snapshot);
        }

        let token = self.access_token().await?;

        let response = self
            .http
            .get(format!("{API_BASE}/me/player/queue"))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        if let Some(err) = Self::map_error_status(&response) {
            return Err(err);
        }

        #[derive(Deserialize)]
        struct ApiQueue {
            currently_playing: Option<ApiTrack>,
            #[serde(default)]
            queue: Vec<ApiTrack>,
        }

        let body: ApiQueue = response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        let snapshot = QueueSnapshot {
            currently_playing: body.currently_playing.map(Into::into),
            queue: body.queue.into_iter().map(Into::into).collect(),
        };
        self.snapshot_cache.put(snapshot.clone());
        Ok(snapshot)
    }

    async fn now_playing(&self) -> Result<Option<NowPlaying>, GatewayError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .get(format!("{API_BASE}/me/player/currently-playing"))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        if response.status().as_u16() == 204 {
            return Ok(None);
        }
        if response.status().as_u16() == 401 {
            // Token likely needs a refresh; drop it and report nothing playing.
            self.clear_token_cache().await;
            return Ok(None);
        }
        if let Some(err) = Self::map_error_status(&response) {
            warn!("now-playing request failed: {err}");
            return Ok(None);
        }

        #[derive(Deserialize)]
        struct ApiNowPlaying {
            item: Option<ApiTrack>,
            #[serde(default)]
            progress_ms: u64,
            #[serde(default)]
            is_playing: bool,
        }

        let body: ApiNowPlaying = response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        Ok(body.item.map(|item| NowPlaying {
            track: item.into(),
            progress_ms: body.progress_ms,
            is_playing: body.is_playing,
        }))
    }
}
