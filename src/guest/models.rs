use serde::{Deserialize, Serialize};

// Validation constants
pub const USERNAME_MAX_LEN: usize = 60;
pub const FINGERPRINT_TOKEN_BYTES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintStatus {
    Active,
    Blocked,
}

impl FingerprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// External identity providers a fingerprint can be verified against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Github,
    Hackclub,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Hackclub => "hackclub",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Github => "GitHub",
            Self::Hackclub => "Hack Club",
        }
    }
}

/// One external identity bound to a fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderIdentity {
    pub external_id: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

/// A verified identity produced by a provider login, ready to be bound.
#[derive(Clone, Debug)]
pub struct VerifiedIdentity {
    pub provider: ProviderKind,
    pub external_id: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

/// One anonymous device/browser, optionally upgraded with a display name
/// and/or verified external identities. The id is an opaque token persisted
/// in a cookie and immutable once created.
#[derive(Clone, Debug, Serialize)]
pub struct Fingerprint {
    pub id: String,
    pub first_seen: i64,
    pub last_queue_attempt: Option<i64>,
    pub cooldown_expires: Option<i64>,
    pub status: FingerprintStatus,
    pub username: Option<String>,
    pub github: Option<ProviderIdentity>,
    pub hackclub: Option<ProviderIdentity>,
    pub created_at: i64,
}

impl Fingerprint {
    pub fn is_blocked(&self) -> bool {
        self.status == FingerprintStatus::Blocked
    }

    /// Seconds of cooldown left at `now`, if any.
    pub fn cooldown_remaining(&self, now: i64) -> Option<i64> {
        self.cooldown_expires
            .filter(|expires| *expires > now)
            .map(|expires| expires - now)
    }

    pub fn identity(&self, provider: ProviderKind) -> Option<&ProviderIdentity> {
        match provider {
            ProviderKind::Github => self.github.as_ref(),
            ProviderKind::Hackclub => self.hackclub.as_ref(),
        }
    }

    pub fn has_verified_identity(&self) -> bool {
        self.github.is_some() || self.hackclub.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Blocked,
    Banned,
    RateLimited,
    Error,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Blocked => "blocked",
            Self::Banned => "banned",
            Self::RateLimited => "rate_limited",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "blocked" => Some(Self::Blocked),
            "banned" => Some(Self::Banned),
            "rate_limited" => Some(Self::RateLimited),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Immutable audit record of one admission decision.
#[derive(Clone, Debug, Serialize)]
pub struct QueueAttempt {
    pub id: i64,
    pub fingerprint_id: String,
    pub track_id: Option<String>,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub status: AttemptStatus,
    pub error_message: Option<String>,
    pub timestamp: i64,
}

/// Input for appending a queue attempt.
#[derive(Clone, Debug)]
pub struct NewQueueAttempt {
    pub fingerprint_id: String,
    pub track_id: Option<String>,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub status: AttemptStatus,
    pub error_message: Option<String>,
    pub timestamp: i64,
}

impl NewQueueAttempt {
    /// A rejected attempt carrying no resolved track metadata.
    pub fn rejected(
        fingerprint_id: &str,
        track_id: Option<&str>,
        status: AttemptStatus,
        message: &str,
        timestamp: i64,
    ) -> Self {
        Self {
            fingerprint_id: fingerprint_id.to_string(),
            track_id: track_id.map(|s| s.to_string()),
            track_name: None,
            artist_name: None,
            status,
            error_message: Some(message.to_string()),
            timestamp,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BannedTrack {
    pub id: i64,
    pub track_id: String,
    pub artist_id: Option<String>,
    pub reason: Option<String>,
    pub created_at: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrequeueStatus {
    Pending,
    Approved,
    Declined,
}

impl PrequeueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }
}

/// A track awaiting human approval before it may reach the playback queue.
#[derive(Clone, Debug, Serialize)]
pub struct PrequeueEntry {
    pub id: String,
    pub fingerprint_id: String,
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_art: Option<String>,
    pub status: PrequeueStatus,
    pub approved_by: Option<String>,
    pub created_at: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub updated_at: i64,
}

/// Result of toggling a vote: the caller's new state and the fresh count.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct VoteToggle {
    pub voted: bool,
    pub count: u64,
}

// Operator-facing projections over the attempt log.

#[derive(Clone, Debug, Serialize)]
pub struct DeviceOverview {
    #[serde(flatten)]
    pub fingerprint: Fingerprint,
    pub total_attempts: u64,
    pub successful_attempts: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActivityEntry {
    #[serde(flatten)]
    pub attempt: QueueAttempt,
    pub username: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct AttemptStats {
    pub total_attempts: u64,
    pub successes: u64,
    pub blocked: u64,
    pub banned: u64,
    pub rate_limited: u64,
    pub errors: u64,
    pub distinct_devices: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct TrackTally {
    pub track_id: String,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub count: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct RequesterTally {
    pub fingerprint_id: String,
    pub username: Option<String>,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_status_roundtrip() {
        for status in [
            AttemptStatus::Success,
            AttemptStatus::Blocked,
            AttemptStatus::Banned,
            AttemptStatus::RateLimited,
            AttemptStatus::Error,
        ] {
            assert_eq!(AttemptStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AttemptStatus::parse("bogus"), None);
    }

    #[test]
    fn test_prequeue_status_roundtrip() {
        for status in [
            PrequeueStatus::Pending,
            PrequeueStatus::Approved,
            PrequeueStatus::Declined,
        ] {
            assert_eq!(PrequeueStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PrequeueStatus::parse(""), None);
    }

    fn fingerprint_with_cooldown(expires: Option<i64>) -> Fingerprint {
        Fingerprint {
            id: "fp-test".to_string(),
            first_seen: 1000,
            last_queue_attempt: None,
            cooldown_expires: expires,
            status: FingerprintStatus::Active,
            username: None,
            github: None,
            hackclub: None,
            created_at: 1000,
        }
    }

    #[test]
    fn test_cooldown_remaining() {
        let fp = fingerprint_with_cooldown(Some(2000));
        assert_eq!(fp.cooldown_remaining(1700), Some(300));
        assert_eq!(fp.cooldown_remaining(2000), None);
        assert_eq!(fp.cooldown_remaining(2500), None);

        let fp = fingerprint_with_cooldown(None);
        assert_eq!(fp.cooldown_remaining(1700), None);
    }

    #[test]
    fn test_has_verified_identity() {
        let mut fp = fingerprint_with_cooldown(None);
        assert!(!fp.has_verified_identity());

        fp.github = Some(ProviderIdentity {
            external_id: "12345".to_string(),
            username: Some("octocat".to_string()),
            avatar_url: None,
        });
        assert!(fp.has_verified_identity());
        assert!(fp.identity(ProviderKind::Github).is_some());
        assert!(fp.identity(ProviderKind::Hackclub).is_none());
    }
}
