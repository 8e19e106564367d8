//! Runtime-tunable policy settings.
//!
//! Policy lives in the `config` key/value table so operators can change it
//! without a restart. Business logic never reads raw strings: each request
//! parses the table once into a [`PolicySnapshot`] of real booleans and
//! integers with documented defaults.

use crate::guest::GuestStore;
use anyhow::Result;

pub mod keys {
    pub const COOLDOWN_DURATION: &str = "cooldown_duration";
    pub const SONGS_BEFORE_COOLDOWN: &str = "songs_before_cooldown";
    pub const FINGERPRINTING_ENABLED: &str = "fingerprinting_enabled";
    pub const URL_INPUT_ENABLED: &str = "url_input_enabled";
    pub const SEARCH_UI_ENABLED: &str = "search_ui_enabled";
    pub const QUEUEING_ENABLED: &str = "queueing_enabled";
    pub const PREQUEUE_ENABLED: &str = "prequeue_enabled";
    pub const ADMIN_PANEL_URL: &str = "admin_panel_url";
    pub const ADMIN_PASSWORD: &str = "admin_password";
    pub const USER_PASSWORD: &str = "user_password";
    pub const REQUIRE_USERNAME: &str = "require_username";
    pub const REQUIRE_GITHUB_AUTH: &str = "require_github_auth";
    pub const REQUIRE_HACKCLUB_AUTH: &str = "require_hackclub_auth";
    pub const MAX_SONG_DURATION: &str = "max_song_duration";
    pub const BAN_EXPLICIT: &str = "ban_explicit";
    pub const VOTING_ENABLED: &str = "voting_enabled";
    pub const AURA_ENABLED: &str = "aura_enabled";
    pub const CONFETTI_ENABLED: &str = "confetti_enabled";
    pub const SPOTIFY_CONNECTED: &str = "spotify_connected";
    pub const SPOTIFY_REFRESH_TOKEN: &str = "spotify_refresh_token";
}

/// Seeded on first run; `INSERT OR IGNORE` so operator edits survive restarts.
pub const DEFAULT_CONFIG: &[(&str, &str)] = &[
    (keys::COOLDOWN_DURATION, "300"),
    (keys::SONGS_BEFORE_COOLDOWN, "1"),
    (keys::FINGERPRINTING_ENABLED, "true"),
    (keys::URL_INPUT_ENABLED, "true"),
    (keys::SEARCH_UI_ENABLED, "true"),
    (keys::QUEUEING_ENABLED, "true"),
    (keys::PREQUEUE_ENABLED, "false"),
    (keys::ADMIN_PANEL_URL, ""),
    (keys::ADMIN_PASSWORD, "admin"),
    (keys::USER_PASSWORD, ""),
    (keys::REQUIRE_USERNAME, "false"),
    (keys::REQUIRE_GITHUB_AUTH, "false"),
    (keys::REQUIRE_HACKCLUB_AUTH, "false"),
    (keys::MAX_SONG_DURATION, "0"),
    (keys::BAN_EXPLICIT, "false"),
    (keys::VOTING_ENABLED, "false"),
    (keys::AURA_ENABLED, "true"),
    (keys::CONFETTI_ENABLED, "true"),
];

/// Config keys readable without authentication. Everything else (passwords
/// in particular) requires the admin surface.
pub const PUBLIC_CONFIG_KEYS: &[&str] = &[
    keys::COOLDOWN_DURATION,
    keys::SONGS_BEFORE_COOLDOWN,
    keys::FINGERPRINTING_ENABLED,
    keys::URL_INPUT_ENABLED,
    keys::SEARCH_UI_ENABLED,
    keys::QUEUEING_ENABLED,
    keys::PREQUEUE_ENABLED,
    keys::REQUIRE_USERNAME,
    keys::REQUIRE_GITHUB_AUTH,
    keys::REQUIRE_HACKCLUB_AUTH,
    keys::MAX_SONG_DURATION,
    keys::BAN_EXPLICIT,
    keys::VOTING_ENABLED,
    keys::AURA_ENABLED,
    keys::CONFETTI_ENABLED,
    keys::SPOTIFY_CONNECTED,
];

/// An immutable, typed view of the policy table.
#[derive(Clone, Debug)]
pub struct PolicySnapshot {
    /// Master switch for the whole queueing surface.
    pub queueing_enabled: bool,
    /// Rate limiting (cooldown + quota) switch.
    pub fingerprinting_enabled: bool,
    pub prequeue_enabled: bool,
    pub require_username: bool,
    pub require_github_auth: bool,
    pub require_hackclub_auth: bool,
    pub ban_explicit: bool,
    pub voting_enabled: bool,
    pub url_input_enabled: bool,
    pub search_ui_enabled: bool,
    /// Cooldown window length in seconds.
    pub cooldown_duration: u32,
    /// Successful admissions allowed inside one trailing window.
    pub songs_before_cooldown: u32,
    /// Maximum track length in seconds; 0 disables the policy.
    pub max_song_duration: u32,
    pub admin_password: String,
    pub user_password: String,
    pub admin_panel_url: String,
}

impl Default for PolicySnapshot {
    fn default() -> Self {
        Self {
            queueing_enabled: true,
            fingerprinting_enabled: true,
            prequeue_enabled: false,
            require_username: false,
            require_github_auth: false,
            require_hackclub_auth: false,
            ban_explicit: false,
            voting_enabled: false,
            url_input_enabled: true,
            search_ui_enabled: true,
            cooldown_duration: 300,
            songs_before_cooldown: 1,
            max_song_duration: 0,
            admin_password: "admin".to_string(),
            user_password: String::new(),
            admin_panel_url: String::new(),
        }
    }
}

impl PolicySnapshot {
    /// Load and parse the current policy. Missing or unparseable values
    /// fall back to the documented defaults.
    pub fn load(store: &dyn GuestStore) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            queueing_enabled: load_bool(store, keys::QUEUEING_ENABLED, defaults.queueing_enabled)?,
            fingerprinting_enabled: load_bool(
                store,
                keys::FINGERPRINTING_ENABLED,
                defaults.fingerprinting_enabled,
            )?,
            prequeue_enabled: load_bool(store, keys::PREQUEUE_ENABLED, defaults.prequeue_enabled)?,
            require_username: load_bool(store, keys::REQUIRE_USERNAME, defaults.require_username)?,
            require_github_auth: load_bool(
                store,
                keys::REQUIRE_GITHUB_AUTH,
                defaults.require_github_auth,
            )?,
            require_hackclub_auth: load_bool(
                store,
                keys::REQUIRE_HACKCLUB_AUTH,
                defaults.require_hackclub_auth,
            )?,
            ban_explicit: load_bool(store, keys::BAN_EXPLICIT, defaults.ban_explicit)?,
            voting_enabled: load_bool(store, keys::VOTING_ENABLED, defaults.voting_enabled)?,
            url_input_enabled: load_bool(
                store,
                keys::URL_INPUT_ENABLED,
                defaults.url_input_enabled,
            )?,
            search_ui_enabled: load_bool(
                store,
                keys::SEARCH_UI_ENABLED,
                defaults.search_ui_enabled,
            )?,
            cooldown_duration: load_u32(store, keys::COOLDOWN_DURATION, defaults.cooldown_duration)?,
            songs_before_cooldown: load_u32(
                store,
                keys::SONGS_BEFORE_COOLDOWN,
                defaults.songs_before_cooldown,
            )?,
            max_song_duration: load_u32(store, keys::MAX_SONG_DURATION, defaults.max_song_duration)?,
            admin_password: load_string(store, keys::ADMIN_PASSWORD, &defaults.admin_password)?,
            user_password: load_string(store, keys::USER_PASSWORD, &defaults.user_password)?,
            admin_panel_url: load_string(store, keys::ADMIN_PANEL_URL, &defaults.admin_panel_url)?,
        })
    }

    /// True when the optional guest door password is active.
    pub fn user_password_required(&self) -> bool {
        !self.user_password.trim().is_empty()
    }

    pub fn max_song_duration_ms(&self) -> Option<u64> {
        if self.max_song_duration > 0 {
            Some(self.max_song_duration as u64 * 1000)
        } else {
            None
        }
    }
}

fn load_bool(store: &dyn GuestStore, key: &str, default: bool) -> Result<bool> {
    Ok(store
        .get_config(key)?
        .as_deref()
        .and_then(parse_bool)
        .unwrap_or(default))
}

fn load_u32(store: &dyn GuestStore, key: &str, default: u32) -> Result<u32> {
    Ok(store
        .get_config(key)?
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default))
}

fn load_string(store: &dyn GuestStore, key: &str, default: &str) -> Result<String> {
    Ok(store
        .get_config(key)?
        .unwrap_or_else(|| default.to_string()))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
