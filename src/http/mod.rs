pub mod breaker;
pub mod client;
pub mod throttle;

pub use breaker::CircuitBreaker;
pub use client::{HttpClient, HttpConfig, HttpResponse};
pub use throttle::Throttle;

/// Errors surfaced by the egress layer. Detectors and the crawler treat all
/// of these as "no data from this URL" and move on.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("circuit breaker open for {0}")]
    BreakerOpen(String),

    #[error("request to {url} failed after {attempts} attempt(s): {source}")]
    Network {
        url: String,
        attempts: u32,
        source: reqwest::Error,
    },

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}
