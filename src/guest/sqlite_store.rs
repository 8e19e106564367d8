use super::models::*;
use super::schema::create_schema;
use super::{GuestStore, PrequeueInsert};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

pub struct SqliteGuestStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGuestStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let conn = Connection::open(path).context("Failed to open guest database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        if is_new_db {
            info!("Creating new guest database at {:?}", path);
        }
        create_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_fingerprint(row: &rusqlite::Row) -> rusqlite::Result<Fingerprint> {
        let status_str: String = row.get("status")?;
        let status = FingerprintStatus::parse(&status_str).unwrap_or(FingerprintStatus::Active);

        let github_id: Option<String> = row.get("github_id")?;
        let github = github_id.map(|external_id| -> rusqlite::Result<ProviderIdentity> {
            Ok(ProviderIdentity {
                external_id,
                username: row.get("github_username")?,
                avatar_url: row.get("github_avatar")?,
            })
        });
        let hackclub_id: Option<String> = row.get("hackclub_id")?;
        let hackclub = hackclub_id.map(|external_id| -> rusqlite::Result<ProviderIdentity> {
            Ok(ProviderIdentity {
                external_id,
                username: row.get("hackclub_username")?,
                avatar_url: row.get("hackclub_avatar")?,
            })
        });

        Ok(Fingerprint {
            id: row.get("id")?,
            first_seen: row.get("first_seen")?,
            last_queue_attempt: row.get("last_queue_attempt")?,
            cooldown_expires: row.get("cooldown_expires")?,
            status,
            username: row.get("username")?,
            github: github.transpose()?,
            hackclub: hackclub.transpose()?,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_attempt(row: &rusqlite::Row) -> rusqlite::Result<QueueAttempt> {
        let status_str: String = row.get("status")?;
        let status = AttemptStatus::parse(&status_str).unwrap_or(AttemptStatus::Error);

        Ok(QueueAttempt {
            id: row.get("id")?,
            fingerprint_id: row.get("fingerprint_id")?,
            track_id: row.get("track_id")?,
            track_name: row.get("track_name")?,
            artist_name: row.get("artist_name")?,
            status,
            error_message: row.get("error_message")?,
            timestamp: row.get("timestamp")?,
        })
    }

    fn row_to_prequeue(row: &rusqlite::Row) -> rusqlite::Result<PrequeueEntry> {
        let status_str: String = row.get("status")?;
        let status = PrequeueStatus::parse(&status_str).unwrap_or(PrequeueStatus::Declined);

        Ok(PrequeueEntry {
            id: row.get("id")?,
            fingerprint_id: row.get("fingerprint_id")?,
            track_id: row.get("track_id")?,
            track_name: row.get("track_name")?,
            artist_name: row.get("artist_name")?,
            album_art: row.get("album_art")?,
            status,
            approved_by: row.get("approved_by")?,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_banned_track(row: &rusqlite::Row) -> rusqlite::Result<BannedTrack> {
        Ok(BannedTrack {
            id: row.get("id")?,
            track_id: row.get("track_id")?,
            artist_id: row.get("artist_id")?,
            reason: row.get("reason")?,
            created_at: row.get("created_at")?,
        })
    }

    fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

const FINGERPRINT_COLUMNS: &str = "id, first_seen, last_queue_attempt, cooldown_expires, status, \
     username, github_id, github_username, github_avatar, \
     hackclub_id, hackclub_username, hackclub_avatar, created_at";

const PREQUEUE_COLUMNS: &str =
    "id, fingerprint_id, track_id, track_name, artist_name, album_art, status, approved_by, created_at";

impl GuestStore for SqliteGuestStore {
    fn get_config(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row("SELECT value FROM config WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn all_config(&self) -> Result<Vec<ConfigEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT key, value, updated_at FROM config ORDER BY key")?;
        let entries = stmt
            .query_map([], |row| {
                Ok(ConfigEntry {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn get_fingerprint(&self, id: &str) -> Result<Option<Fingerprint>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FINGERPRINT_COLUMNS} FROM fingerprints WHERE id = ?1"
        ))?;
        let fingerprint = stmt
            .query_row(params![id], Self::row_to_fingerprint)
            .optional()?;
        Ok(fingerprint)
    }

    fn create_fingerprint(
        &self,
        id: &str,
        username: Option<&str>,
        now: i64,
    ) -> Result<Fingerprint> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO fingerprints (id, first_seen, status, username, created_at)
                 VALUES (?1, ?2, 'active', ?3, ?2)",
                params![id, now, username],
            )?;
        }
        self.get_fingerprint(id)?
            .context("Fingerprint vanished right after insert")
    }

    fn set_username_if_absent(&self, id: &str, username: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE fingerprints SET username = ?1 WHERE id = ?2 AND username IS NULL",
            params![username, id],
        )?;
        Ok(changed > 0)
    }

    fn bind_identity(
        &self,
        id: &str,
        identity: &VerifiedIdentity,
        now: i64,
    ) -> Result<Fingerprint> {
        {
            let conn = self.conn.lock().unwrap();
            let (id_col, username_col, avatar_col) = match identity.provider {
                ProviderKind::Github => ("github_id", "github_username", "github_avatar"),
                ProviderKind::Hackclub => ("hackclub_id", "hackclub_username", "hackclub_avatar"),
            };

            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM fingerprints WHERE id = ?1",
                    params![id],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);

            if exists {
                conn.execute(
                    &format!(
                        "UPDATE fingerprints
                         SET username = COALESCE(?1, username), {id_col} = ?2,
                             {username_col} = ?1, {avatar_col} = ?3
                         WHERE id = ?4"
                    ),
                    params![identity.username, identity.external_id, identity.avatar_url, id],
                )?;
            } else {
                conn.execute(
                    &format!(
                        "INSERT INTO fingerprints
                             (id, first_seen, status, username, {id_col}, {username_col}, {avatar_col}, created_at)
                         VALUES (?1, ?2, 'active', ?3, ?4, ?3, ?5, ?2)"
                    ),
                    params![id, now, identity.username, identity.external_id, identity.avatar_url],
                )?;
            }
        }
        self.get_fingerprint(id)?
            .context("Fingerprint vanished right after identity bind")
    }

    fn set_blocked(&self, id: &str, blocked: bool) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let status = if blocked {
            FingerprintStatus::Blocked
        } else {
            FingerprintStatus::Active
        };
        let changed = conn.execute(
            "UPDATE fingerprints SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(changed > 0)
    }

    fn set_cooldown(&self, id: &str, expires: Option<i64>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE fingerprints SET cooldown_expires = ?1 WHERE id = ?2",
            params![expires, id],
        )?;
        Ok(changed > 0)
    }

    fn touch_last_queue_attempt(&self, id: &str, now: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE fingerprints SET last_queue_attempt = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        Ok(())
    }

    fn reset_all_cooldowns(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE fingerprints SET cooldown_expires = NULL WHERE cooldown_expires IS NOT NULL",
            [],
        )?;
        Ok(changed)
    }

    fn list_devices(&self) -> Result<Vec<DeviceOverview>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {cols},
                    COUNT(qa.id) AS total_attempts,
                    COALESCE(SUM(qa.status = 'success'), 0) AS successful_attempts
             FROM fingerprints f
             LEFT JOIN queue_attempts qa ON qa.fingerprint_id = f.id
             GROUP BY f.id
             ORDER BY f.first_seen DESC",
            cols = FINGERPRINT_COLUMNS
                .split(", ")
                .map(|c| format!("f.{c}"))
                .collect::<Vec<_>>()
                .join(", "),
        ))?;

        let devices = stmt
            .query_map([], |row| {
                let fingerprint = Self::row_to_fingerprint(row)?;
                let total_attempts: i64 = row.get("total_attempts")?;
                let successful_attempts: i64 = row.get("successful_attempts")?;
                Ok(DeviceOverview {
                    fingerprint,
                    total_attempts: total_attempts as u64,
                    successful_attempts: successful_attempts as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(devices)
    }

    fn record_attempt(&self, attempt: &NewQueueAttempt) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO queue_attempts
                 (fingerprint_id, track_id, track_name, artist_name, status, error_message, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                attempt.fingerprint_id,
                attempt.track_id,
                attempt.track_name,
                attempt.artist_name,
                attempt.status.as_str(),
                attempt.error_message,
                attempt.timestamp,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn count_recent_successes(&self, fingerprint_id: &str, since: i64) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM queue_attempts
             WHERE fingerprint_id = ?1 AND status = 'success' AND timestamp > ?2",
            params![fingerprint_id, since],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT qa.id, qa.fingerprint_id, qa.track_id, qa.track_name, qa.artist_name,
                    qa.status, qa.error_message, qa.timestamp, f.username
             FROM queue_attempts qa
             LEFT JOIN fingerprints f ON f.id = qa.fingerprint_id
             ORDER BY qa.timestamp DESC, qa.id DESC
             LIMIT ?1",
        )?;

        let entries = stmt
            .query_map(params![limit as i64], |row| {
                let attempt = Self::row_to_attempt(row)?;
                Ok(ActivityEntry {
                    attempt,
                    username: row.get("username")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn attempt_stats(&self) -> Result<AttemptStats> {
        let conn = self.conn.lock().unwrap();
        let mut stats = AttemptStats::default();

        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM queue_attempts GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((status, count as u64))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for (status, count) in rows {
            stats.total_attempts += count;
            match AttemptStatus::parse(&status) {
                Some(AttemptStatus::Success) => stats.successes = count,
                Some(AttemptStatus::Blocked) => stats.blocked = count,
                Some(AttemptStatus::Banned) => stats.banned = count,
                Some(AttemptStatus::RateLimited) => stats.rate_limited = count,
                Some(AttemptStatus::Error) | None => stats.errors += count,
            }
        }

        let distinct: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT fingerprint_id) FROM queue_attempts",
            [],
            |row| row.get(0),
        )?;
        stats.distinct_devices = distinct as u64;

        Ok(stats)
    }

    fn top_tracks(&self, limit: usize) -> Result<Vec<TrackTally>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT track_id, MAX(track_name), MAX(artist_name), COUNT(*) AS count
             FROM queue_attempts
             WHERE status = 'success' AND track_id IS NOT NULL
             GROUP BY track_id
             ORDER BY count DESC
             LIMIT ?1",
        )?;

        let tracks = stmt
            .query_map(params![limit as i64], |row| {
                let count: i64 = row.get(3)?;
                Ok(TrackTally {
                    track_id: row.get(0)?,
                    track_name: row.get(1)?,
                    artist_name: row.get(2)?,
                    count: count as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn top_requesters(&self, limit: usize) -> Result<Vec<RequesterTally>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT qa.fingerprint_id, f.username, COUNT(*) AS count
             FROM queue_attempts qa
             LEFT JOIN fingerprints f ON f.id = qa.fingerprint_id
             WHERE qa.status = 'success'
             GROUP BY qa.fingerprint_id
             ORDER BY count DESC
             LIMIT ?1",
        )?;

        let requesters = stmt
            .query_map(params![limit as i64], |row| {
                let count: i64 = row.get(2)?;
                Ok(RequesterTally {
                    fingerprint_id: row.get(0)?,
                    username: row.get(1)?,
                    count: count as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(requesters)
    }

    fn is_track_banned(&self, track_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let banned = conn
            .query_row(
                "SELECT 1 FROM banned_tracks WHERE track_id = ?1",
                params![track_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(banned)
    }

    fn add_banned_track(
        &self,
        track_id: &str,
        artist_id: Option<&str>,
        reason: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().timestamp();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO banned_tracks (track_id, artist_id, reason, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![track_id, artist_id, reason, now],
        )?;
        Ok(inserted > 0)
    }

    fn remove_banned_track(&self, track_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM banned_tracks WHERE track_id = ?1",
            params![track_id],
        )?;
        Ok(deleted > 0)
    }

    fn list_banned_tracks(&self) -> Result<Vec<BannedTrack>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, track_id, artist_id, reason, created_at
             FROM banned_tracks ORDER BY created_at DESC",
        )?;
        let tracks = stmt
            .query_map([], Self::row_to_banned_track)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn insert_prequeue(&self, entry: &PrequeueEntry) -> Result<PrequeueInsert> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO prequeue
                 (id, fingerprint_id, track_id, track_name, artist_name, album_art, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.fingerprint_id,
                entry.track_id,
                entry.track_name,
                entry.artist_name,
                entry.album_art,
                entry.status.as_str(),
                entry.created_at,
            ],
        );

        match result {
            Ok(_) => Ok(PrequeueInsert::Inserted),
            Err(err) if Self::is_unique_violation(&err) => Ok(PrequeueInsert::DuplicatePending),
            Err(err) => Err(err).context("Failed to insert prequeue entry"),
        }
    }

    fn get_prequeue(&self, id: &str) -> Result<Option<PrequeueEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PREQUEUE_COLUMNS} FROM prequeue WHERE id = ?1"
        ))?;
        let entry = stmt
            .query_row(params![id], Self::row_to_prequeue)
            .optional()?;
        Ok(entry)
    }

    fn resolve_prequeue(&self, id: &str, status: PrequeueStatus, approver: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE prequeue SET status = ?1, approved_by = ?2
             WHERE id = ?3 AND status = 'pending'",
            params![status.as_str(), approver, id],
        )?;
        Ok(changed > 0)
    }

    fn pending_prequeue(&self) -> Result<Vec<PrequeueEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PREQUEUE_COLUMNS} FROM prequeue
             WHERE status = 'pending' ORDER BY created_at DESC"
        ))?;
        let entries = stmt
            .query_map([], Self::row_to_prequeue)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn toggle_vote(&self, track_id: &str, fingerprint_id: &str, now: i64) -> Result<VoteToggle> {
        let conn = self.conn.lock().unwrap();

        let deleted = conn.execute(
            "DELETE FROM votes WHERE track_id = ?1 AND fingerprint_id = ?2",
            params![track_id, fingerprint_id],
        )?;

        let voted = if deleted == 0 {
            conn.execute(
                "INSERT INTO votes (track_id, fingerprint_id, created_at) VALUES (?1, ?2, ?3)",
                params![track_id, fingerprint_id, now],
            )?;
            true
        } else {
            false
        };

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM votes WHERE track_id = ?1",
            params![track_id],
            |row| row.get(0),
        )?;

        Ok(VoteToggle {
            voted,
            count: count as u64,
        })
    }

    fn vote_counts(&self) -> Result<Vec<(String, u64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT track_id, COUNT(*) FROM votes GROUP BY track_id")?;
        let counts = stmt
            .query_map([], |row| {
                let count: i64 = row.get(1)?;
                Ok((row.get::<_, String>(0)?, count as u64))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    fn votes_by_fingerprint(&self, fingerprint_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT track_id FROM votes WHERE fingerprint_id = ?1 ORDER BY created_at",
        )?;
        let tracks = stmt
            .query_map(params![fingerprint_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn reset_guest_data(&self) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        // Children before fingerprints to keep foreign keys satisfied.
        tx.execute("DELETE FROM queue_attempts", [])?;
        tx.execute("DELETE FROM prequeue", [])?;
        tx.execute("DELETE FROM votes", [])?;
        tx.execute("DELETE FROM fingerprints", [])?;
        tx.commit()?;
        Ok(())
    }
}
