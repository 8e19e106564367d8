//! Fingerprint registry: maps durable client tokens to identity records and
//! evaluates the guest gating chain.
//!
//! The two gate policies (verified external identity, display username) are
//! evaluated in a fixed order so precedence is auditable: provider
//! verification first, username second, and a verified identity satisfies
//! the username requirement.

use super::models::*;
use super::GuestStore;
use crate::settings::PolicySnapshot;
use anyhow::Result;
use rand::RngCore;
use std::sync::Arc;

/// Which identity providers are actually wired up, so gate evaluation can
/// distinguish "you must log in" from "login is required but unconfigured".
#[derive(Clone, Copy, Debug, Default)]
pub struct ProviderAvailability {
    pub github: bool,
    pub hackclub: bool,
}

impl ProviderAvailability {
    pub fn get(&self, provider: ProviderKind) -> bool {
        match provider {
            ProviderKind::Github => self.github,
            ProviderKind::Hackclub => self.hackclub,
        }
    }
}

/// State of one provider gate for one fingerprint.
#[derive(Clone, Copy, Debug)]
pub struct ProviderGateStatus {
    pub provider: ProviderKind,
    pub required: bool,
    pub verified: bool,
    pub configured: bool,
}

impl ProviderGateStatus {
    /// The gate blocks: verification required and not yet satisfied.
    pub fn outstanding(&self) -> bool {
        self.required && !self.verified
    }
}

/// Result of running the full gate chain.
#[derive(Clone, Debug)]
pub struct GateEvaluation {
    /// Provider gates in evaluation order.
    pub providers: Vec<ProviderGateStatus>,
    /// The username gate blocks (only meaningful when no provider gate does).
    pub requires_username: bool,
}

impl GateEvaluation {
    pub fn verification_outstanding(&self) -> bool {
        self.providers.iter().any(ProviderGateStatus::outstanding)
    }

    /// Providers whose verification is outstanding.
    pub fn missing_providers(&self) -> Vec<ProviderKind> {
        self.providers
            .iter()
            .filter(|g| g.outstanding())
            .map(|g| g.provider)
            .collect()
    }

    /// Providers that are required-but-unconfigured: the operator has turned
    /// the gate on without wiring up the login.
    pub fn unconfigured_required(&self) -> Vec<ProviderKind> {
        self.providers
            .iter()
            .filter(|g| g.outstanding() && !g.configured)
            .map(|g| g.provider)
            .collect()
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderGateStatus> {
        self.providers.iter().find(|g| g.provider == kind)
    }

    pub fn blocked(&self) -> bool {
        self.verification_outstanding() || self.requires_username
    }
}

/// Outcome of resolving a client token.
#[derive(Clone, Debug)]
pub enum FingerprintResolution {
    /// Record exists (or was just created) and every gate passes.
    Ready {
        fingerprint: Fingerprint,
        gates: GateEvaluation,
    },
    /// Identity verification is outstanding. The record exists so the
    /// provider callback has something to bind to.
    NeedsVerification {
        fingerprint: Fingerprint,
        gates: GateEvaluation,
    },
    /// A username is required and missing. No record is created for a brand
    /// new token in this state.
    NeedsUsername { gates: GateEvaluation },
}

pub struct FingerprintRegistry {
    store: Arc<dyn GuestStore>,
}

impl FingerprintRegistry {
    pub fn new(store: Arc<dyn GuestStore>) -> Self {
        Self { store }
    }

    /// Mints a fresh 128-bit token, hex encoded.
    pub fn mint_token() -> String {
        let mut bytes = [0u8; FINGERPRINT_TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Runs the gate chain for a (possibly absent) fingerprint record.
    /// `proposed_username` participates as if already applied, so a first
    /// request that carries a username is not bounced.
    pub fn evaluate_gates(
        policy: &PolicySnapshot,
        availability: &ProviderAvailability,
        fingerprint: Option<&Fingerprint>,
        proposed_username: Option<&str>,
    ) -> GateEvaluation {
        let provider_gate = |provider: ProviderKind, required: bool| ProviderGateStatus {
            provider,
            required,
            verified: fingerprint
                .map(|fp| fp.identity(provider).is_some())
                .unwrap_or(false),
            configured: availability.get(provider),
        };

        let providers = vec![
            provider_gate(ProviderKind::Github, policy.require_github_auth),
            provider_gate(ProviderKind::Hackclub, policy.require_hackclub_auth),
        ];
        let verification_outstanding = providers.iter().any(ProviderGateStatus::outstanding);

        let has_username = fingerprint
            .and_then(|fp| fp.username.as_deref())
            .or(proposed_username)
            .map(|u| !u.trim().is_empty())
            .unwrap_or(false);
        let has_verified = fingerprint
            .map(Fingerprint::has_verified_identity)
            .unwrap_or(false);

        // Verification outranks the username gate, and a verified identity
        // substitutes for a username.
        let requires_username = policy.require_username
            && !has_username
            && !has_verified
            && !verification_outstanding;

        GateEvaluation {
            providers,
            requires_username,
        }
    }

    pub fn resolve_or_create(
        &self,
        policy: &PolicySnapshot,
        availability: &ProviderAvailability,
        token: Option<&str>,
        proposed_username: Option<&str>,
        now: i64,
    ) -> Result<FingerprintResolution> {
        let token = match token {
            Some(t) => t.to_string(),
            None => Self::mint_token(),
        };
        let proposed_username = sanitize_username(proposed_username);
        let proposed_username = proposed_username.as_deref();

        let mut existing = self.store.get_fingerprint(&token)?;

        // First-write-wins: apply the proposed username only if none is set.
        if let (Some(fp), Some(username)) = (&existing, proposed_username) {
            if fp.username.is_none() && self.store.set_username_if_absent(&fp.id, username)? {
                existing = self.store.get_fingerprint(&token)?;
            }
        }

        let gates =
            Self::evaluate_gates(policy, availability, existing.as_ref(), proposed_username);

        if gates.verification_outstanding() {
            // Create the record so the provider callback can bind to it.
            let fingerprint = match existing {
                Some(fp) => fp,
                None => self
                    .store
                    .create_fingerprint(&token, proposed_username, now)?,
            };
            return Ok(FingerprintResolution::NeedsVerification { fingerprint, gates });
        }

        if gates.requires_username {
            return Ok(FingerprintResolution::NeedsUsername { gates });
        }

        let fingerprint = match existing {
            Some(fp) => fp,
            None => self
                .store
                .create_fingerprint(&token, proposed_username, now)?,
        };
        Ok(FingerprintResolution::Ready { fingerprint, gates })
    }

    // Admin operations. All idempotent.

    pub fn set_blocked(&self, fingerprint_id: &str, blocked: bool) -> Result<bool> {
        self.store.set_blocked(fingerprint_id, blocked)
    }

    pub fn reset_cooldown(&self, fingerprint_id: &str) -> Result<bool> {
        self.store.set_cooldown(fingerprint_id, None)
    }

    pub fn reset_all_cooldowns(&self) -> Result<usize> {
        self.store.reset_all_cooldowns()
    }
}

fn sanitize_username(username: Option<&str>) -> Option<String> {
    username
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(|u| {
            u.chars()
                .filter(|c| !c.is_control())
                .take(USERNAME_MAX_LEN)
                .collect::<String>()
        })
}
