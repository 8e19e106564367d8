//! Human-approval workflow interposed between submission and playback.
//!
//! Submissions go into a pending holding stage; an approver (admin UI or a
//! notification-channel button) either approves, which commits the track to
//! the playback queue and credits the original submitter, or declines. The
//! state machine is pending -> approved | declined, terminal either way.
//!
//! Submission deliberately skips the cooldown/quota checks of the direct
//! admission path: the human approver is the gate. An approval still writes
//! the success attempt the direct path's quota counts, so heavy prequeue
//! use fills the submitter's trailing window.

use crate::guest::{
    AttemptStatus, GuestStore, NewQueueAttempt, PrequeueEntry, PrequeueInsert, PrequeueStatus,
};
use crate::notifications::PrequeueNotifier;
use crate::settings::PolicySnapshot;
use crate::spotify::{GatewayError, PlaybackGateway, TrackRef};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PrequeueError {
    #[error("Prequeue is currently disabled.")]
    ServiceDisabled,
    #[error("Could not fingerprint your device.")]
    UnknownDevice,
    #[error("Invalid track reference. Use a Spotify track link, URI or id.")]
    InvalidReference,
    #[error(
        "Song is too long. Maximum duration is {mins}:{secs:02}.",
        mins = .max_secs / 60,
        secs = .max_secs % 60
    )]
    TooLong { max_secs: u32 },
    #[error("This song is already in the queue or currently playing.")]
    DuplicateInQueue,
    #[error("This song is already pending approval.")]
    DuplicatePending,
    #[error("Prequeue entry not found.")]
    NotFound,
    #[error("Track already processed.")]
    AlreadyProcessed,
    #[error("No active Spotify device found. Please start playing music on a device.")]
    NoActiveDevice,
    #[error("Failed to reach Spotify: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PrequeueError {
    fn from_gateway(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidTrack => Self::InvalidReference,
            GatewayError::NoActiveDevice => Self::NoActiveDevice,
            other => Self::Upstream(other.to_string()),
        }
    }
}

fn internal(err: anyhow::Error) -> PrequeueError {
    PrequeueError::Internal(err.to_string())
}

/// A successful submission: the pending entry plus whether a notification
/// actually went out.
#[derive(Debug)]
pub struct PrequeueSubmission {
    pub entry: PrequeueEntry,
    pub notified: bool,
}

pub struct PrequeueWorkflow {
    store: Arc<dyn GuestStore>,
    gateway: Arc<dyn PlaybackGateway>,
    notifier: Arc<dyn PrequeueNotifier>,
}

impl PrequeueWorkflow {
    pub fn new(
        store: Arc<dyn GuestStore>,
        gateway: Arc<dyn PlaybackGateway>,
        notifier: Arc<dyn PrequeueNotifier>,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
        }
    }

    pub async fn submit(
        &self,
        policy: &PolicySnapshot,
        fingerprint_id: &str,
        track_ref: &TrackRef,
        now: i64,
    ) -> Result<PrequeueSubmission, PrequeueError> {
        if !policy.prequeue_enabled {
            return Err(PrequeueError::ServiceDisabled);
        }

        if self
            .store
            .get_fingerprint(fingerprint_id)
            .map_err(internal)?
            .is_none()
        {
            return Err(PrequeueError::UnknownDevice);
        }

        let track_id = track_ref
            .canonical_id()
            .ok_or(PrequeueError::InvalidReference)?;

        let track = self
            .gateway
            .resolve(&track_id)
            .await
            .map_err(PrequeueError::from_gateway)?;

        if let Some(max_ms) = policy.max_song_duration_ms() {
            if track.duration_ms > max_ms {
                return Err(PrequeueError::TooLong {
                    max_secs: policy.max_song_duration,
                });
            }
        }

        // Duplicate-live check: best-effort against the external queue.
        match self.gateway.queue_snapshot().await {
            Ok(snapshot) if snapshot.contains(&track.id) => {
                return Err(PrequeueError::DuplicateInQueue);
            }
            Ok(_) => {}
            Err(err) => warn!("Could not check queue for duplicates: {err}"),
        }

        let entry = PrequeueEntry {
            id: Uuid::new_v4().simple().to_string(),
            fingerprint_id: fingerprint_id.to_string(),
            track_id: track.id.clone(),
            track_name: track.name.clone(),
            artist_name: track.artists.clone(),
            album_art: track.album_art.clone(),
            status: PrequeueStatus::Pending,
            approved_by: None,
            created_at: now,
        };

        // Duplicate-pending is the fail-closed check: the storage layer's
        // unique index is the authority, not this insert's caller.
        match self.store.insert_prequeue(&entry).map_err(internal)? {
            PrequeueInsert::Inserted => {}
            PrequeueInsert::DuplicatePending => return Err(PrequeueError::DuplicatePending),
        }

        let notified = if self.notifier.configured() {
            self.notifier.notify_pending(&track, &entry.id).await
        } else {
            false
        };

        info!(
            "Prequeued \"{}\" by {} as {} (notified: {notified})",
            entry.track_name, entry.artist_name, entry.id
        );
        Ok(PrequeueSubmission { entry, notified })
    }

    /// Approves a pending entry: re-resolves the track (its metadata may
    /// have changed upstream), commits it to the playback queue, and writes
    /// the success attempt attributed to the original submitter.
    pub async fn approve(
        &self,
        prequeue_id: &str,
        approver: &str,
        now: i64,
    ) -> Result<PrequeueEntry, PrequeueError> {
        let entry = self
            .store
            .get_prequeue(prequeue_id)
            .map_err(internal)?
            .ok_or(PrequeueError::NotFound)?;

        if entry.status != PrequeueStatus::Pending {
            return Err(PrequeueError::AlreadyProcessed);
        }

        let track = self
            .gateway
            .resolve(&entry.track_id)
            .await
            .map_err(PrequeueError::from_gateway)?;

        self.gateway
            .enqueue(&track.uri)
            .await
            .map_err(PrequeueError::from_gateway)?;

        // The transition is one atomic statement; losing it here means a
        // concurrent approver got there first.
        if !self
            .store
            .resolve_prequeue(prequeue_id, PrequeueStatus::Approved, approver)
            .map_err(internal)?
        {
            warn!("Prequeue {prequeue_id} was resolved concurrently");
            return Err(PrequeueError::AlreadyProcessed);
        }

        self.store
            .record_attempt(&NewQueueAttempt {
                fingerprint_id: entry.fingerprint_id.clone(),
                track_id: Some(entry.track_id.clone()),
                track_name: Some(entry.track_name.clone()),
                artist_name: Some(entry.artist_name.clone()),
                status: AttemptStatus::Success,
                error_message: None,
                timestamp: now,
            })
            .map_err(internal)?;

        info!(
            "Approved \"{}\" ({}) by {approver}",
            entry.track_name, prequeue_id
        );
        self.store
            .get_prequeue(prequeue_id)
            .map_err(internal)?
            .ok_or(PrequeueError::NotFound)
    }

    pub fn decline(&self, prequeue_id: &str, approver: &str) -> Result<PrequeueEntry, PrequeueError> {
        let entry = self
            .store
            .get_prequeue(prequeue_id)
            .map_err(internal)?
            .ok_or(PrequeueError::NotFound)?;

        if entry.status != PrequeueStatus::Pending {
            return Err(PrequeueError::AlreadyProcessed);
        }

        if !self
            .store
            .resolve_prequeue(prequeue_id, PrequeueStatus::Declined, approver)
            .map_err(internal)?
        {
            return Err(PrequeueError::AlreadyProcessed);
        }

        info!(
            "Declined \"{}\" ({}) by {approver}",
            entry.track_name, prequeue_id
        );
        self.store
            .get_prequeue(prequeue_id)
            .map_err(internal)?
            .ok_or(PrequeueError::NotFound)
    }
}
