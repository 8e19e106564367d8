//! Scripted collaborators standing in for Spotify and Slack.

use async_trait::async_trait;
use jukebox_server::notifications::PrequeueNotifier;
use jukebox_server::spotify::{
    GatewayError, NowPlaying, PlaybackGateway, QueueSnapshot, TrackMetadata,
};
use std::sync::Mutex;

pub fn track(id: &str) -> TrackMetadata {
    TrackMetadata {
        id: id.to_string(),
        name: format!("Track {id}"),
        artists: "Test Artist".to_string(),
        album: "Test Album".to_string(),
        album_art: Some("https://img.test/a.png".to_string()),
        duration_ms: 200_000,
        uri: format!("spotify:track:{id}"),
        explicit: false,
    }
}

pub fn explicit_track(id: &str) -> TrackMetadata {
    TrackMetadata {
        explicit: true,
        ..track(id)
    }
}

/// Gateway whose catalog, live snapshot and failure modes are set by each
/// test. Records every enqueued URI.
#[derive(Default)]
pub struct ScriptedGateway {
    pub tracks: Mutex<Vec<TrackMetadata>>,
    pub snapshot: Mutex<QueueSnapshot>,
    pub enqueued: Mutex<Vec<String>>,
    pub fail_snapshot: Mutex<bool>,
    pub fail_enqueue: Mutex<Option<&'static str>>,
}

impl ScriptedGateway {
    pub fn with_tracks(tracks: Vec<TrackMetadata>) -> Self {
        Self {
            tracks: Mutex::new(tracks),
            ..Default::default()
        }
    }

    pub fn enqueued_uris(&self) -> Vec<String> {
        self.enqueued.lock().unwrap().clone()
    }

    pub fn set_now_playing(&self, track: Option<TrackMetadata>) {
        self.snapshot.lock().unwrap().currently_playing = track;
    }
}

#[async_trait]
impl PlaybackGateway for ScriptedGateway {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackMetadata>, GatewayError> {
        let tracks = self.tracks.lock().unwrap();
        Ok(tracks
            .iter()
            .filter(|t| t.name.contains(query) || t.artists.contains(query))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn resolve(&self, track_id: &str) -> Result<TrackMetadata, GatewayError> {
        self.tracks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == track_id)
            .cloned()
            .ok_or(GatewayError::InvalidTrack)
    }

    async fn enqueue(&self, track_uri: &str) -> Result<(), GatewayError> {
        match *self.fail_enqueue.lock().unwrap() {
            Some("no_device") => return Err(GatewayError::NoActiveDevice),
            Some(message) => return Err(GatewayError::Upstream(message.to_string())),
            None => {}
        }
        self.enqueued.lock().unwrap().push(track_uri.to_string());
        Ok(())
    }

    async fn queue_snapshot(&self) -> Result<QueueSnapshot, GatewayError> {
        if *self.fail_snapshot.lock().unwrap() {
            return Err(GatewayError::Upstream("queue unavailable".to_string()));
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn now_playing(&self) -> Result<Option<NowPlaying>, GatewayError> {
        Ok(self
            .snapshot
            .lock()
            .unwrap()
            .currently_playing
            .clone()
            .map(|track| NowPlaying {
                track,
                progress_ms: 1000,
                is_playing: true,
            }))
    }
}

/// Captures notification dispatches instead of talking to Slack.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn sent_ids(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PrequeueNotifier for RecordingNotifier {
    fn configured(&self) -> bool {
        true
    }

    async fn notify_pending(&self, _track: &TrackMetadata, prequeue_id: &str) -> bool {
        self.sent.lock().unwrap().push(prequeue_id.to_string());
        true
    }
}
