mod rate_limit;
mod requests_logging;

pub use rate_limit::{search_rate_limit_layer, IpKeyExtractor, SEARCH_BURST, SEARCH_PER_SECOND};
pub use requests_logging::{log_requests, RequestsLoggingLevel};
