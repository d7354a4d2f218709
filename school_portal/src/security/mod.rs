//! Brute-force protection for the login endpoints.
//!
//! Attempts are counted per `(endpoint, identifier)` in a fixed window. Once
//! the window's budget is spent the identifier is locked out; with
//! exponential backoff each repeated violation doubles the lockout, capped at
//! 2^5 times the base.
//!
//! ## Example
//!
//! ```
//! use school_portal::security::{RateLimitResult, RateLimiter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let limiter = RateLimiter::new();
//!
//!     match limiter.check_and_record("login", "203.0.113.7").await? {
//!         RateLimitResult::Allowed { remaining } => println!("{remaining} attempts left"),
//!         RateLimitResult::Locked { retry_after } => println!("retry in {retry_after}s"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod rate_limiter;

pub use errors::{RateLimitError, RateLimiterResult};
pub use rate_limiter::{
    DEFAULT_LOGIN_ATTEMPTS, DEFAULT_LOGIN_LOCKOUT_SECS, DEFAULT_LOGIN_WINDOW_SECS, LOGIN_ENDPOINT,
    RateLimitConfig, RateLimitResult, RateLimiter,
};
