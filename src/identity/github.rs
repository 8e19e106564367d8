use super::{IdentityProvider, OAuthSettings};
use crate::guest::{ProviderKind, VerifiedIdentity};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const SCOPE: &str = "read:user";
const USER_AGENT: &str = "jukebox-server";
const REQUEST_TIMEOUT_SECS: u64 = 10;

pub struct GithubProvider {
    http: reqwest::Client,
    settings: OAuthSettings,
}

impl GithubProvider {
    pub fn new(settings: OAuthSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build GitHub HTTP client");
        Self { http, settings }
    }
}

#[async_trait]
impl IdentityProvider for GithubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Github
    }

    fn configured(&self) -> bool {
        self.settings.configured()
    }

    fn authorize_url(&self, state: &str) -> Result<String> {
        if !self.configured() {
            bail!("GitHub OAuth not configured");
        }
        let client_id = self.settings.client_id.as_deref().unwrap_or_default();
        let redirect_uri = self.settings.redirect_uri.as_deref().unwrap_or_default();

        Ok(format!(
            "{AUTHORIZE_URL}?client_id={}&redirect_uri={}&scope={}&state={}",
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(SCOPE),
            urlencoding::encode(state),
        ))
    }

    async fn exchange_code(&self, code: &str) -> Result<VerifiedIdentity> {
        if !self.configured() {
            bail!("GitHub OAuth not configured");
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: Option<String>,
        }

        let token: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .header("Accept", "application/json")
            .json(&serde_json::json!({
                "client_id": self.settings.client_id,
                "client_secret": self.settings.client_secret,
                "code": code,
            }))
            .send()
            .await
            .context("GitHub token exchange request failed")?
            .json()
            .await
            .context("GitHub token exchange returned an unreadable body")?;

        let access_token = token
            .access_token
            .context("GitHub token exchange returned no access token")?;

        #[derive(Deserialize)]
        struct GithubUser {
            id: u64,
            login: String,
            avatar_url: Option<String>,
        }

        let user: GithubUser = self
            .http
            .get(USER_URL)
            .bearer_auth(&access_token)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .context("GitHub user request failed")?
            .error_for_status()
            .context("GitHub user request rejected")?
            .json()
            .await
            .context("GitHub user response was unreadable")?;

        Ok(VerifiedIdentity {
            provider: ProviderKind::Github,
            external_id: user.id.to_string(),
            username: Some(user.login),
            avatar_url: user.avatar_url,
        })
    }
}
