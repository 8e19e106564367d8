use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::settings::DEFAULT_CONFIG;

/// Creates the guest database schema. Idempotent: every statement is
/// `IF NOT EXISTS` and config seeding is `INSERT OR IGNORE`, so an existing
/// database keeps its data and operator-tuned settings.
pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS fingerprints (
            id TEXT PRIMARY KEY,
            first_seen INTEGER NOT NULL,
            last_queue_attempt INTEGER,
            cooldown_expires INTEGER,
            status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'blocked')),
            username TEXT,
            github_id TEXT,
            github_username TEXT,
            github_avatar TEXT,
            hackclub_id TEXT,
            hackclub_username TEXT,
            hackclub_avatar TEXT,
            created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE TABLE IF NOT EXISTS queue_attempts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fingerprint_id TEXT NOT NULL REFERENCES fingerprints(id),
            track_id TEXT,
            track_name TEXT,
            artist_name TEXT,
            status TEXT NOT NULL,
            error_message TEXT,
            timestamp INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_attempts_fingerprint_status
            ON queue_attempts(fingerprint_id, status, timestamp);

        CREATE TABLE IF NOT EXISTS banned_tracks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            track_id TEXT UNIQUE NOT NULL,
            artist_id TEXT,
            reason TEXT,
            created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE TABLE IF NOT EXISTS prequeue (
            id TEXT PRIMARY KEY,
            fingerprint_id TEXT NOT NULL REFERENCES fingerprints(id),
            track_id TEXT NOT NULL,
            track_name TEXT NOT NULL,
            artist_name TEXT NOT NULL,
            album_art TEXT,
            status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'approved', 'declined')),
            approved_by TEXT,
            created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        -- The one invariant that must fail closed under races: at most one
        -- *pending* entry per track id, enforced by the storage layer.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_prequeue_pending_track
            ON prequeue(track_id) WHERE status = 'pending';

        CREATE TABLE IF NOT EXISTS votes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            track_id TEXT NOT NULL,
            fingerprint_id TEXT NOT NULL,
            created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            UNIQUE(track_id, fingerprint_id)
        );

        CREATE TABLE IF NOT EXISTS config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );
        ",
    )
    .context("Failed to create guest database schema")?;

    let mut seed = conn.prepare("INSERT OR IGNORE INTO config (key, value) VALUES (?1, ?2)")?;
    for (key, value) in DEFAULT_CONFIG {
        seed.execute(params![key, value])?;
    }

    Ok(())
}
