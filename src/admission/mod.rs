//! Queue-admission control: decides, for a `(fingerprint, track)` pair,
//! whether the track may be forwarded to playback.
//!
//! Policy is applied in a fixed order: cheap local checks (feature gate,
//! identity, block, cooldown, quota) short-circuit before any network call;
//! denylist/content/duration run against resolved metadata; the duplicate
//! check runs last so it sees the freshest queue snapshot. Every rejected
//! *attempt* is recorded in the audit log; pure input validation is not.

use crate::guest::{AttemptStatus, GuestStore, NewQueueAttempt};
use crate::settings::PolicySnapshot;
use crate::spotify::{GatewayError, PlaybackGateway, TrackMetadata, TrackRef};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("Queueing is currently disabled.")]
    ServiceDisabled,
    #[error("Could not fingerprint your device.")]
    UnknownDevice,
    #[error("This device is blocked from queueing songs.")]
    DeviceBlocked,
    #[error("Please wait before queueing another song!")]
    CoolingDown { remaining_secs: i64 },
    #[error("You've reached the limit of {limit} song(s) before cooldown. Please wait!")]
    QuotaExceeded { limit: u32, remaining_secs: i64 },
    #[error("Invalid track reference. Use a Spotify track link, URI or id.")]
    InvalidReference,
    #[error("This song is not allowed.")]
    TrackBanned,
    #[error("Explicit songs are not allowed.")]
    ExplicitBlocked,
    #[error(
        "Song is too long. Maximum duration is {mins}:{secs:02}.",
        mins = .max_secs / 60,
        secs = .max_secs % 60
    )]
    TooLong { max_secs: u32 },
    #[error("This song is already in the queue or currently playing.")]
    DuplicateInQueue,
    #[error("No active Spotify device found. Please start playing music on a device.")]
    NoActiveDevice,
    #[error("Failed to queue track: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AdmissionError {
    /// Machine-readable countdown for rate-limit rejections.
    pub fn cooldown_remaining(&self) -> Option<i64> {
        match self {
            Self::CoolingDown { remaining_secs } => Some(*remaining_secs),
            Self::QuotaExceeded { remaining_secs, .. } => Some(*remaining_secs),
            _ => None,
        }
    }

    fn from_gateway(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidTrack => Self::InvalidReference,
            GatewayError::NoActiveDevice => Self::NoActiveDevice,
            other => Self::Upstream(other.to_string()),
        }
    }
}

fn internal(err: anyhow::Error) -> AdmissionError {
    AdmissionError::Internal(err.to_string())
}

pub struct AdmissionController {
    store: Arc<dyn GuestStore>,
    gateway: Arc<dyn PlaybackGateway>,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn GuestStore>, gateway: Arc<dyn PlaybackGateway>) -> Self {
        Self { store, gateway }
    }

    /// Runs the full admission chain and, on success, commits the track to
    /// the playback queue. Returns the resolved metadata of the queued track.
    pub async fn admit(
        &self,
        policy: &PolicySnapshot,
        fingerprint_id: &str,
        track_ref: &TrackRef,
        now: i64,
    ) -> Result<TrackMetadata, AdmissionError> {
        if !policy.queueing_enabled {
            return Err(AdmissionError::ServiceDisabled);
        }

        let fingerprint = self
            .store
            .get_fingerprint(fingerprint_id)
            .map_err(internal)?
            .ok_or(AdmissionError::UnknownDevice)?;

        if fingerprint.is_blocked() {
            self.record(NewQueueAttempt::rejected(
                fingerprint_id,
                None,
                AttemptStatus::Blocked,
                "Device blocked",
                now,
            ))?;
            return Err(AdmissionError::DeviceBlocked);
        }

        if policy.fingerprinting_enabled {
            if let Some(remaining_secs) = fingerprint.cooldown_remaining(now) {
                self.record(NewQueueAttempt::rejected(
                    fingerprint_id,
                    None,
                    AttemptStatus::RateLimited,
                    "Cooldown active",
                    now,
                ))?;
                return Err(AdmissionError::CoolingDown { remaining_secs });
            }

            // Quota pre-check over the trailing window. Reaching the limit
            // here means earlier successes already used it up, so a fresh
            // cooldown starts now.
            let window_start = now - policy.cooldown_duration as i64;
            let recent = self
                .store
                .count_recent_successes(fingerprint_id, window_start)
                .map_err(internal)?;
            if recent >= policy.songs_before_cooldown as u64 {
                self.store
                    .set_cooldown(fingerprint_id, Some(now + policy.cooldown_duration as i64))
                    .map_err(internal)?;
                self.record(NewQueueAttempt::rejected(
                    fingerprint_id,
                    None,
                    AttemptStatus::RateLimited,
                    "Cooldown limit reached",
                    now,
                ))?;
                return Err(AdmissionError::QuotaExceeded {
                    limit: policy.songs_before_cooldown,
                    remaining_secs: policy.cooldown_duration as i64,
                });
            }
        }

        // From here on the track reference is needed. Malformed input fails
        // before any state mutation and without an audit row.
        let track_id = track_ref
            .canonical_id()
            .ok_or(AdmissionError::InvalidReference)?;

        let track = match self.gateway.resolve(&track_id).await {
            Ok(track) => track,
            Err(GatewayError::InvalidTrack) => return Err(AdmissionError::InvalidReference),
            Err(err) => {
                self.record(NewQueueAttempt::rejected(
                    fingerprint_id,
                    Some(&track_id),
                    AttemptStatus::Error,
                    &err.to_string(),
                    now,
                ))?;
                return Err(AdmissionError::from_gateway(err));
            }
        };

        // Denylist check uses the canonical id so URL aliases cannot dodge it.
        if self.store.is_track_banned(&track.id).map_err(internal)? {
            self.record(self.track_attempt(
                fingerprint_id,
                &track,
                AttemptStatus::Banned,
                Some("Track banned"),
                now,
            ))?;
            return Err(AdmissionError::TrackBanned);
        }

        if policy.ban_explicit && track.explicit {
            self.record(self.track_attempt(
                fingerprint_id,
                &track,
                AttemptStatus::Blocked,
                Some("Explicit content not allowed"),
                now,
            ))?;
            return Err(AdmissionError::ExplicitBlocked);
        }

        if let Some(max_ms) = policy.max_song_duration_ms() {
            if track.duration_ms > max_ms {
                self.record(self.track_attempt(
                    fingerprint_id,
                    &track,
                    AttemptStatus::Blocked,
                    Some("Song exceeds maximum duration"),
                    now,
                ))?;
                return Err(AdmissionError::TooLong {
                    max_secs: policy.max_song_duration,
                });
            }
        }

        // Duplicate-live check is best-effort: an unavailable snapshot must
        // not block admission.
        match self.gateway.queue_snapshot().await {
            Ok(snapshot) if snapshot.contains(&track.id) => {
                self.record(self.track_attempt(
                    fingerprint_id,
                    &track,
                    AttemptStatus::Blocked,
                    Some("Already in queue"),
                    now,
                ))?;
                return Err(AdmissionError::DuplicateInQueue);
            }
            Ok(_) => {}
            Err(err) => {
                warn!("Duplicate check unavailable, failing open: {err}");
            }
        }

        if let Err(err) = self.gateway.enqueue(&track.uri).await {
            self.record(self.track_attempt(
                fingerprint_id,
                &track,
                AttemptStatus::Error,
                Some(&err.to_string()),
                now,
            ))?;
            return Err(AdmissionError::from_gateway(err));
        }

        info!(
            "Queued \"{}\" by {} for fingerprint {}",
            track.name, track.artists, fingerprint_id
        );
        self.record(self.track_attempt(
            fingerprint_id,
            &track,
            AttemptStatus::Success,
            None,
            now,
        ))?;
        self.store
            .touch_last_queue_attempt(fingerprint_id, now)
            .map_err(internal)?;

        // Post-commit recompute: re-query the trailing window (which now
        // includes the success just logged) rather than incrementing a
        // counter, so concurrent admissions converge on a consistent count.
        if policy.fingerprinting_enabled {
            let window_start = now - policy.cooldown_duration as i64;
            let recent = self
                .store
                .count_recent_successes(fingerprint_id, window_start)
                .map_err(internal)?;
            if recent >= policy.songs_before_cooldown as u64 {
                self.store
                    .set_cooldown(fingerprint_id, Some(now + policy.cooldown_duration as i64))
                    .map_err(internal)?;
            }
        }

        Ok(track)
    }

    fn track_attempt(
        &self,
        fingerprint_id: &str,
        track: &TrackMetadata,
        status: AttemptStatus,
        message: Option<&str>,
        now: i64,
    ) -> NewQueueAttempt {
        NewQueueAttempt {
            fingerprint_id: fingerprint_id.to_string(),
            track_id: Some(track.id.clone()),
            track_name: Some(track.name.clone()),
            artist_name: Some(track.artists.clone()),
            status,
            error_message: message.map(|m| m.to_string()),
            timestamp: now,
        }
    }

    fn record(&self, attempt: NewQueueAttempt) -> Result<(), AdmissionError> {
        self.store.record_attempt(&attempt).map_err(internal)?;
        Ok(())
    }
}
