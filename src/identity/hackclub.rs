use super::{IdentityProvider, OAuthSettings};
use crate::guest::{ProviderKind, VerifiedIdentity};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const AUTHORIZE_URL: &str = "https://auth.hackclub.com/oauth/authorize";
const TOKEN_URL: &str = "https://auth.hackclub.com/oauth/token";
const USERINFO_URL: &str = "https://auth.hackclub.com/api/v1/me";
const SCOPE: &str = "openid profile name slack_id";
const REQUEST_TIMEOUT_SECS: u64 = 10;

pub struct HackClubProvider {
    http: reqwest::Client,
    settings: OAuthSettings,
}

impl HackClubProvider {
    pub fn new(settings: OAuthSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build Hack Club HTTP client");
        Self { http, settings }
    }
}

/// The profile payload wraps the interesting fields in an `identity` object,
/// with top-level fallbacks depending on granted scopes.
#[derive(Default, Deserialize)]
struct HackClubProfile {
    identity: Option<HackClubIdentity>,
    id: Option<serde_json::Value>,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Default, Deserialize)]
struct HackClubIdentity {
    id: Option<serde_json::Value>,
    sub: Option<String>,
    slack_id: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    name: Option<String>,
    primary_email: Option<String>,
    avatar_url: Option<String>,
    picture: Option<String>,
}

fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl HackClubProfile {
    fn into_identity(self) -> Result<VerifiedIdentity> {
        let identity = self.identity.unwrap_or_default();

        let external_id = identity
            .id
            .as_ref()
            .and_then(value_to_string)
            .or(identity.sub.clone())
            .or(identity.slack_id.clone())
            .or_else(|| self.id.as_ref().and_then(value_to_string))
            .or(self.email.clone())
            .context("Hack Club profile carried no usable identifier")?;

        let full_name = [identity.first_name.as_deref(), identity.last_name.as_deref()]
            .iter()
            .flatten()
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        let username = if !full_name.trim().is_empty() {
            Some(full_name.trim().to_string())
        } else {
            identity
                .name
                .or(self.name)
                .or_else(|| {
                    identity
                        .primary_email
                        .or(self.email)
                        .and_then(|e| e.split('@').next().map(|s| s.to_string()))
                })
                .or_else(|| Some(format!("hackclub-{external_id}")))
        };

        Ok(VerifiedIdentity {
            provider: ProviderKind::Hackclub,
            external_id,
            username,
            avatar_url: identity.avatar_url.or(identity.picture).or(self.avatar_url),
        })
    }
}

#[async_trait]
impl IdentityProvider for HackClubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Hackclub
    }

    fn configured(&self) -> bool {
        self.settings.configured()
    }

    fn authorize_url(&self, state: &str) -> Result<String> {
        if !self.configured() {
            bail!("Hack Club OAuth not configured");
        }
        let client_id = self.settings.client_id.as_deref().unwrap_or_default();
        let redirect_uri = self.settings.redirect_uri.as_deref().unwrap_or_default();

        Ok(format!(
            "{AUTHORIZE_URL}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(SCOPE),
            urlencoding::encode(state),
        ))
    }

    async fn exchange_code(&self, code: &str) -> Result<VerifiedIdentity> {
        if !self.configured() {
            bail!("Hack Club OAuth not configured");
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: Option<String>,
        }

        let token: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .json(&serde_json::json!({
                "client_id": self.settings.client_id,
                "client_secret": self.settings.client_secret,
                "redirect_uri": self.settings.redirect_uri,
                "code": code,
                "grant_type": "authorization_code",
            }))
            .send()
            .await
            .context("Hack Club token exchange request failed")?
            .json()
            .await
            .context("Hack Club token exchange returned an unreadable body")?;

        let access_token = token
            .access_token
            .context("Hack Club token exchange returned no access token")?;

        let profile: HackClubProfile = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(&access_token)
            .send()
            .await
            .context("Hack Club profile request failed")?
            .error_for_status()
            .context("Hack Club profile request rejected")?
            .json()
            .await
            .context("Hack Club profile response was unreadable")?;

        profile.into_identity()
    }
}
