//! Outbound approval notifications. Fire-and-forget: a failed dispatch is
//! logged for operators and never fails the submission that triggered it.

mod slack;

pub use slack::{InteractiveAction, InteractivePayload, PrequeueAction, SlackNotifier, SlackUser};

use crate::spotify::TrackMetadata;
use async_trait::async_trait;

#[async_trait]
pub trait PrequeueNotifier: Send + Sync {
    /// Whether the channel is wired up at all; lets callers skip dispatch
    /// logging when there is nothing to dispatch to.
    fn configured(&self) -> bool;

    /// Sends a pending-approval notification carrying enough context for an
    /// approver to decide without opening the admin UI. Returns whether the
    /// message went out.
    async fn notify_pending(&self, track: &TrackMetadata, prequeue_id: &str) -> bool;
}

/// Used when no notification channel is configured.
pub struct NoopNotifier;

#[async_trait]
impl PrequeueNotifier for NoopNotifier {
    fn configured(&self) -> bool {
        false
    }

    async fn notify_pending(&self, _track: &TrackMetadata, _prequeue_id: &str) -> bool {
        false
    }
}
