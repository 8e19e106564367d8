use axum::extract::FromRef;

use crate::admission::AdmissionController;
use crate::guest::{FingerprintRegistry, GuestStore, ProviderAvailability, ProviderKind};
use crate::identity::IdentityProvider;
use crate::notifications::SlackNotifier;
use crate::prequeue::PrequeueWorkflow;
use crate::spotify::{PlaybackGateway, SpotifyClient};
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedGuestStore = Arc<dyn GuestStore>;
pub type GuardedGateway = Arc<dyn PlaybackGateway>;
pub type GuardedRegistry = Arc<FingerprintRegistry>;
pub type GuardedAdmission = Arc<AdmissionController>;
pub type GuardedPrequeue = Arc<PrequeueWorkflow>;
pub type OptionalSpotifyClient = Option<Arc<SpotifyClient>>;
pub type OptionalSlackResponder = Option<Arc<SlackNotifier>>;
pub type GuardedProviders = Arc<Vec<Arc<dyn IdentityProvider>>>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub hash: String,
    pub store: GuardedGuestStore,
    pub gateway: GuardedGateway,
    pub registry: GuardedRegistry,
    pub admission: GuardedAdmission,
    pub prequeue: GuardedPrequeue,
    /// The concrete Spotify client, when the gateway is the real one; used by
    /// the account-connect routes to manage the refresh token.
    pub spotify: OptionalSpotifyClient,
    /// Responder for Slack interactive callbacks.
    pub slack: OptionalSlackResponder,
    pub providers: GuardedProviders,
}

impl ServerState {
    pub fn provider(&self, kind: ProviderKind) -> Option<&Arc<dyn IdentityProvider>> {
        self.providers.iter().find(|p| p.kind() == kind)
    }

    pub fn provider_availability(&self) -> ProviderAvailability {
        ProviderAvailability {
            github: self
                .provider(ProviderKind::Github)
                .is_some_and(|p| p.configured()),
            hackclub: self
                .provider(ProviderKind::Hackclub)
                .is_some_and(|p| p.configured()),
        }
    }
}

impl FromRef<ServerState> for GuardedGuestStore {
    fn from_ref(input: &ServerState) -> Self {
        input.store.clone()
    }
}

impl FromRef<ServerState> for GuardedGateway {
    fn from_ref(input: &ServerState) -> Self {
        input.gateway.clone()
    }
}

impl FromRef<ServerState> for GuardedRegistry {
    fn from_ref(input: &ServerState) -> Self {
        input.registry.clone()
    }
}

impl FromRef<ServerState> for GuardedAdmission {
    fn from_ref(input: &ServerState) -> Self {
        input.admission.clone()
    }
}

impl FromRef<ServerState> for GuardedPrequeue {
    fn from_ref(input: &ServerState) -> Self {
        input.prequeue.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for OptionalSpotifyClient {
    fn from_ref(input: &ServerState) -> Self {
        input.spotify.clone()
    }
}

impl FromRef<ServerState> for OptionalSlackResponder {
    fn from_ref(input: &ServerState) -> Self {
        input.slack.clone()
    }
}

impl FromRef<ServerState> for GuardedProviders {
    fn from_ref(input: &ServerState) -> Self {
        input.providers.clone()
    }
}
