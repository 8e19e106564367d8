mod models;
mod registry;
mod schema;
mod sqlite_store;

pub use models::*;
pub use registry::{
    FingerprintRegistry, FingerprintResolution, GateEvaluation, ProviderAvailability,
    ProviderGateStatus,
};
pub use sqlite_store::SqliteGuestStore;

use anyhow::Result;

/// Outcome of inserting a prequeue entry against the pending-uniqueness
/// constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrequeueInsert {
    Inserted,
    DuplicatePending,
}

/// Durable state for the guest-facing queue: fingerprints, the append-only
/// attempt log, the track denylist, prequeue entries, votes and the config
/// key/value table. One SQLite database behind one trait.
pub trait GuestStore: Send + Sync {
    // Config key/value
    fn get_config(&self, key: &str) -> Result<Option<String>>;
    fn set_config(&self, key: &str, value: &str) -> Result<()>;
    fn all_config(&self) -> Result<Vec<ConfigEntry>>;

    // Fingerprints
    fn get_fingerprint(&self, id: &str) -> Result<Option<Fingerprint>>;
    fn create_fingerprint(
        &self,
        id: &str,
        username: Option<&str>,
        now: i64,
    ) -> Result<Fingerprint>;
    /// First-write-wins: returns true only if the username was applied.
    fn set_username_if_absent(&self, id: &str, username: &str) -> Result<bool>;
    /// Binds a verified identity, creating the fingerprint if needed.
    fn bind_identity(
        &self,
        id: &str,
        identity: &VerifiedIdentity,
        now: i64,
    ) -> Result<Fingerprint>;
    fn set_blocked(&self, id: &str, blocked: bool) -> Result<bool>;
    fn set_cooldown(&self, id: &str, expires: Option<i64>) -> Result<bool>;
    fn touch_last_queue_attempt(&self, id: &str, now: i64) -> Result<()>;
    fn reset_all_cooldowns(&self) -> Result<usize>;
    fn list_devices(&self) -> Result<Vec<DeviceOverview>>;

    // Attempt log (append-only)
    fn record_attempt(&self, attempt: &NewQueueAttempt) -> Result<i64>;
    /// Successful attempts by this fingerprint strictly after `since`.
    fn count_recent_successes(&self, fingerprint_id: &str, since: i64) -> Result<u64>;
    fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>>;
    fn attempt_stats(&self) -> Result<AttemptStats>;
    fn top_tracks(&self, limit: usize) -> Result<Vec<TrackTally>>;
    fn top_requesters(&self, limit: usize) -> Result<Vec<RequesterTally>>;

    // Denylist
    fn is_track_banned(&self, track_id: &str) -> Result<bool>;
    /// Returns false if the track id was already banned.
    fn add_banned_track(
        &self,
        track_id: &str,
        artist_id: Option<&str>,
        reason: Option<&str>,
    ) -> Result<bool>;
    fn remove_banned_track(&self, track_id: &str) -> Result<bool>;
    fn list_banned_tracks(&self) -> Result<Vec<BannedTrack>>;

    // Prequeue
    fn insert_prequeue(&self, entry: &PrequeueEntry) -> Result<PrequeueInsert>;
    fn get_prequeue(&self, id: &str) -> Result<Option<PrequeueEntry>>;
    /// Transitions pending -> approved|declined. Returns false when the entry
    /// was not pending (or does not exist); the check and the transition are
    /// one statement, so concurrent resolvers cannot both win.
    fn resolve_prequeue(&self, id: &str, status: PrequeueStatus, approver: &str) -> Result<bool>;
    fn pending_prequeue(&self) -> Result<Vec<PrequeueEntry>>;

    // Votes
    fn toggle_vote(&self, track_id: &str, fingerprint_id: &str, now: i64) -> Result<VoteToggle>;
    fn vote_counts(&self) -> Result<Vec<(String, u64)>>;
    fn votes_by_fingerprint(&self, fingerprint_id: &str) -> Result<Vec<String>>;

    /// Bulk reset: wipes fingerprints, attempts, prequeue and votes. Config
    /// and the denylist survive.
    fn reset_guest_data(&self) -> Result<()>;
}
