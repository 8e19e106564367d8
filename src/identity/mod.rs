//! Guest identity verification providers.
//!
//! Each provider exposes whether it is configured, builds an authorization
//! URL, and exchanges a callback code for a [`VerifiedIdentity`] that the
//! fingerprint registry binds to the caller's token. The admission core only
//! ever sees the resulting bound identity.

mod github;
mod hackclub;

pub use github::GithubProvider;
pub use hackclub::HackClubProvider;

use crate::guest::{ProviderKind, VerifiedIdentity};
use anyhow::Result;
use async_trait::async_trait;

/// Client credentials + redirect for one OAuth provider, typically sourced
/// from the environment.
#[derive(Clone, Debug, Default)]
pub struct OAuthSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

impl OAuthSettings {
    pub fn configured(&self) -> bool {
        self.client_id.as_deref().is_some_and(|s| !s.is_empty())
            && self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn configured(&self) -> bool;
    /// The URL to send the guest to, carrying the CSRF state token.
    fn authorize_url(&self, state: &str) -> Result<String>;
    /// Exchanges a callback code for the verified identity tuple.
    async fn exchange_code(&self, code: &str) -> Result<VerifiedIdentity>;
}
