//! Rate limiter errors.

use thiserror::Error;

pub type RateLimiterResult<T> = Result<T, RateLimitError>;

#[derive(Debug, Error)]
pub enum RateLimitError {
    /// `check_and_record` was called for an endpoint with no limits registered
    #[error("No rate limit configured for endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("Invalid rate limit configuration: {0}")]
    Configuration(String),
}
