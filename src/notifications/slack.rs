use super::PrequeueNotifier;
use crate::spotify::TrackMetadata;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Posts pending-approval messages to a Slack incoming webhook with
/// interactive approve/decline buttons. The button action ids carry the
/// prequeue entry id; the interactive endpoint maps them back.
pub struct SlackNotifier {
    http: reqwest::Client,
    webhook_url: Option<String>,
    enabled: bool,
}

impl SlackNotifier {
    pub fn new(webhook_url: Option<String>, enabled: bool) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build Slack HTTP client");

        Self {
            http,
            webhook_url: webhook_url.filter(|u| !u.trim().is_empty()),
            enabled,
        }
    }

    /// Replaces the original interactive message, acknowledging the action
    /// to the channel. Best-effort.
    pub async fn respond(&self, response_url: &str, text: &str) {
        let result = self
            .http
            .post(response_url)
            .json(&json!({ "text": text, "replace_original": true }))
            .send()
            .await;
        if let Err(err) = result {
            warn!("Failed to post Slack action response: {err}");
        }
    }

    fn pending_message(track: &TrackMetadata, prequeue_id: &str) -> serde_json::Value {
        json!({
            "text": "New song queued for approval",
            "blocks": [
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!("*New Song Request*\n*{}*\nby {}", track.name, track.artists)
                    },
                    "accessory": {
                        "type": "image",
                        "image_url": track.album_art.as_deref().unwrap_or("https://via.placeholder.com/200"),
                        "alt_text": track.album
                    }
                },
                {
                    "type": "section",
                    "fields": [
                        { "type": "mrkdwn", "text": format!("*Album*\n{}", track.album) },
                        { "type": "mrkdwn", "text": format!("*Duration*\n{}", format_duration(track.duration_ms)) }
                    ]
                },
                {
                    "type": "actions",
                    "elements": [
                        {
                            "type": "button",
                            "text": { "type": "plain_text", "text": "Approve", "emoji": true },
                            "value": prequeue_id,
                            "action_id": format!("approve_{prequeue_id}"),
                            "style": "primary"
                        },
                        {
                            "type": "button",
                            "text": { "type": "plain_text", "text": "Decline", "emoji": true },
                            "value": prequeue_id,
                            "action_id": format!("decline_{prequeue_id}"),
                            "style": "danger"
                        }
                    ]
                }
            ]
        })
    }
}

#[async_trait]
impl PrequeueNotifier for SlackNotifier {
    fn configured(&self) -> bool {
        self.enabled && self.webhook_url.is_some()
    }

    async fn notify_pending(&self, track: &TrackMetadata, prequeue_id: &str) -> bool {
        let Some(webhook_url) = self.webhook_url.as_deref().filter(|_| self.enabled) else {
            return false;
        };

        let message = Self::pending_message(track, prequeue_id);
        match self.http.post(webhook_url).json(&message).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Sent prequeue notification for {prequeue_id}");
                true
            }
            Ok(response) => {
                warn!(
                    "Slack webhook returned {} for prequeue {prequeue_id}",
                    response.status()
                );
                false
            }
            Err(err) => {
                warn!("Failed to send Slack notification: {err}");
                false
            }
        }
    }
}

fn format_duration(duration_ms: u64) -> String {
    let total_secs = duration_ms / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

// Inbound interactivity payload, reduced to the fields this service acts on.

#[derive(Debug, Deserialize)]
pub struct InteractivePayload {
    #[serde(default)]
    pub actions: Vec<InteractiveAction>,
    pub user: Option<SlackUser>,
    pub response_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InteractiveAction {
    pub action_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SlackUser {
    pub id: Option<String>,
    pub username: Option<String>,
}

impl SlackUser {
    pub fn display(&self) -> String {
        self.username
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| "slack".to_string())
    }
}

/// An approve/decline button press, decoded from the action id.
#[derive(Debug, PartialEq, Eq)]
pub enum PrequeueAction {
    Approve(String),
    Decline(String),
}

impl PrequeueAction {
    pub fn parse(action_id: &str) -> Option<Self> {
        if let Some(id) = action_id.strip_prefix("approve_") {
            (!id.is_empty()).then(|| Self::Approve(id.to_string()))
        } else if let Some(id) = action_id.strip_prefix("decline_") {
            (!id.is_empty()).then(|| Self::Decline(id.to_string()))
        } else {
            None
        }
    }
}
