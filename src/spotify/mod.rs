//! Playback queue gateway: the narrow interface to the external music
//! provider. Admission and prequeue logic only ever see [`PlaybackGateway`];
//! the Spotify Web API client lives behind it.

mod cache;
mod client;

pub use cache::{Clock, SystemClock, TtlCache};
pub use client::{SpotifyClient, SpotifyCredentials};

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Track metadata as the core depends on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub id: String,
    pub name: String,
    /// Display string, e.g. "Artist A, Artist B".
    pub artists: String,
    pub album: String,
    pub album_art: Option<String>,
    pub duration_ms: u64,
    /// Provider-native handle used for enqueueing.
    pub uri: String,
    pub explicit: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NowPlaying {
    #[serde(flatten)]
    pub track: TrackMetadata,
    pub progress_ms: u64,
    pub is_playing: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct QueueSnapshot {
    pub currently_playing: Option<TrackMetadata>,
    pub queue: Vec<TrackMetadata>,
}

impl QueueSnapshot {
    /// Whether the track is already live: queued or currently playing.
    pub fn contains(&self, track_id: &str) -> bool {
        self.currently_playing
            .as_ref()
            .is_some_and(|t| t.id == track_id)
            || self.queue.iter().any(|t| t.id == track_id)
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Spotify credentials not configured")]
    NotConfigured,
    #[error("Spotify authentication failed: {0}")]
    Auth(String),
    #[error("unknown or malformed track reference")]
    InvalidTrack,
    #[error("no active playback device")]
    NoActiveDevice,
    #[error("rate limited by Spotify, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Spotify request failed: {0}")]
    Upstream(String),
}

/// The consumed playback capability. Implemented by [`SpotifyClient`] in
/// production and by scripted mocks in tests.
#[async_trait]
pub trait PlaybackGateway: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackMetadata>, GatewayError>;
    /// Resolves a canonical track id to full metadata.
    async fn resolve(&self, track_id: &str) -> Result<TrackMetadata, GatewayError>;
    /// Enqueues by provider-native handle. Implementations invalidate any
    /// snapshot cache on success so the submitter sees their own track.
    async fn enqueue(&self, track_uri: &str) -> Result<(), GatewayError>;
    async fn queue_snapshot(&self) -> Result<QueueSnapshot, GatewayError>;
    async fn now_playing(&self) -> Result<Option<NowPlaying>, GatewayError>;
}

/// A caller-supplied track reference: a raw id, or a share URL/URI.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TrackRef {
    pub track_id: Option<String>,
    pub track_url: Option<String>,
}

impl TrackRef {
    pub fn from_id(id: &str) -> Self {
        Self {
            track_id: Some(id.to_string()),
            track_url: None,
        }
    }

    /// The canonical track id, parsing a URL/URI reference if necessary.
    /// None means the reference is malformed.
    pub fn canonical_id(&self) -> Option<String> {
        if let Some(id) = self.track_id.as_deref().map(str::trim) {
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
        self.track_url.as_deref().and_then(parse_track_url)
    }
}

lazy_static! {
    static ref TRACK_URL_RE: Regex = Regex::new(r"track/([a-zA-Z0-9]+)").unwrap();
}

/// Extracts a track id from `spotify:track:...` URIs and open.spotify.com
/// share URLs, tolerating query strings and locale path segments.
pub fn parse_track_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    if let Some(rest) = url.strip_prefix("spotify:track:") {
        let id = rest.split('?').next().unwrap_or_default();
        return (!id.is_empty()).then(|| id.to_string());
    }

    TRACK_URL_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}


#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> TrackMetadata {
        TrackMetadata {
            id: id.to_string(),
            name: "Song".to_string(),
            artists: "Artist".to_string(),
            album: "Album".to_string(),
            album_art: None,
            duration_ms: 200_000,
            uri: format!("spotify:track:{id}"),
            explicit: false,
        }
    }

    #[test]
    fn test_parse_track_url_variants() {
        assert_eq!(
            parse_track_url("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"),
            Some("4uLU6hMCjMI75M1A2tKUQC".to_string())
        );
        assert_eq!(
            parse_track_url("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=abc123"),
            Some("4uLU6hMCjMI75M1A2tKUQC".to_string())
        );
        assert_eq!(
            parse_track_url("https://open.spotify.com/intl-it/track/4uLU6hMCjMI75M1A2tKUQC"),
            Some("4uLU6hMCjMI75M1A2tKUQC".to_string())
        );
        assert_eq!(
            parse_track_url("spotify:track:4uLU6hMCjMI75M1A2tKUQC"),
            Some("4uLU6hMCjMI75M1A2tKUQC".to_string())
        );
        assert_eq!(
            parse_track_url("spotify:track:4uLU6hMCjMI75M1A2tKUQC?context=playlist"),
            Some("4uLU6hMCjMI75M1A2tKUQC".to_string())
        );
    }

    #[test]
    fn test_parse_track_url_rejects_garbage() {
        assert_eq!(parse_track_url(""), None);
        assert_eq!(parse_track_url("https://open.spotify.com/album/abc"), None);
        assert_eq!(parse_track_url("spotify:track:"), None);
        assert_eq!(parse_track_url("not a url at all"), None);
    }

    #[test]
    fn test_track_ref_prefers_raw_id() {
        let track_ref = TrackRef {
            track_id: Some("raw-id".to_string()),
            track_url: Some("spotify:track:other".to_string()),
        };
        assert_eq!(track_ref.canonical_id(), Some("raw-id".to_string()));
    }

    #[test]
    fn test_track_ref_falls_back_to_url() {
        let track_ref = TrackRef {
            track_id: Some("   ".to_string()),
            track_url: Some("spotify:track:abc".to_string()),
        };
        assert_eq!(track_ref.canonical_id(), Some("abc".to_string()));

        assert_eq!(TrackRef::default().canonical_id(), None);
    }

    #[test]
    fn test_snapshot_contains() {
        let snapshot = QueueSnapshot {
            currently_playing: Some(track("playing")),
            queue: vec![track("queued-1"), track("queued-2")],
        };
        assert!(snapshot.contains("playing"));
        assert!(snapshot.contains("queued-2"));
        assert!(!snapshot.contains("other"));
        assert!(!QueueSnapshot::default().contains("playing"));
    }
}
