//! IP-based rate limiting for the expensive upstream-search endpoint,
//! using tower-governor. The domain-level cooldown/quota logic lives in the
//! admission controller; this layer only shields the Spotify search API
//! from request floods.

use axum::{
    extract::{ConnectInfo, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::KeyExtractor, GovernorError, GovernorLayer,
};
use tracing::warn;

use super::super::state::ServerState;

/// Sustained search requests per second per IP.
pub const SEARCH_PER_SECOND: u64 = 2;

/// Burst allowance above the sustained rate.
pub const SEARCH_BURST: u32 = 10;

/// Extracts the client IP from ConnectInfo for IP-based rate limiting.
#[derive(Clone)]
pub struct IpKeyExtractor;

impl KeyExtractor for IpKeyExtractor {
    type Key = SocketAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr)
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

fn rate_limit_error_handler(err: GovernorError) -> Response {
    match err {
        GovernorError::TooManyRequests { .. } => {
            warn!("Search rate limit exceeded");
            StatusCode::TOO_MANY_REQUESTS.into_response()
        }
        other => {
            warn!("Rate limiting error: {other:?}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Applies the search rate limit to a router. Kept as a router transform so
/// the governor's middleware generics stay inferred.
pub fn search_rate_limit_layer(routes: Router<ServerState>) -> Router<ServerState> {
    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(SEARCH_PER_SECOND)
            .burst_size(SEARCH_BURST)
            .key_extractor(IpKeyExtractor)
            .finish()
            .expect("Invalid search rate limit configuration"),
    );
    routes.layer(GovernorLayer::new(config).error_handler(rate_limit_error_handler))
}
