//! Rate limiting with exponential backoff for the login endpoints.

use super::errors::{RateLimitError, RateLimiterResult};
use chrono::{DateTime, Duration, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

/// Endpoint key for password login
pub const LOGIN_ENDPOINT: &str = "login";

pub const DEFAULT_LOGIN_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOGIN_WINDOW_SECS: u64 = 300;
pub const DEFAULT_LOGIN_LOCKOUT_SECS: u64 = 900;

/// Rate limit configuration for an endpoint
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum attempts allowed in window
    pub max_attempts: u32,

    /// Time window in seconds
    pub window_secs: u64,

    /// Lockout duration in seconds after exceeding limit
    pub lockout_secs: u64,

    /// Whether to use exponential backoff
    pub exponential_backoff: bool,
}

impl RateLimitConfig {
    /// Configuration for login endpoint
    pub fn login() -> Self {
        Self {
            max_attempts: env_or("RATE_LIMIT_LOGIN_ATTEMPTS", DEFAULT_LOGIN_ATTEMPTS),
            window_secs: env_or("RATE_LIMIT_LOGIN_WINDOW_SECS", DEFAULT_LOGIN_WINDOW_SECS),
            lockout_secs: env_or("RATE_LIMIT_LOGIN_LOCKOUT_SECS", DEFAULT_LOGIN_LOCKOUT_SECS),
            exponential_backoff: true,
        }
    }

    /// Reject configurations that would lock out every request
    pub fn validate(&self) -> RateLimiterResult<()> {
        if self.max_attempts == 0 {
            return Err(RateLimitError::Configuration(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.window_secs == 0 {
            return Err(RateLimitError::Configuration(
                "window_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn lockout_for(&self, violations: u32) -> u64 {
        if self.exponential_backoff {
            // 2^violations * base lockout
            self.lockout_secs * 2u64.pow(violations.min(5))
        } else {
            self.lockout_secs
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Rate limit attempt record
#[derive(Debug, Clone)]
struct RateLimitAttempt {
    attempts: u32,
    window_start: DateTime<Utc>,
    locked_until: Option<DateTime<Utc>>,
    consecutive_violations: u32,
}

impl RateLimitAttempt {
    fn fresh(now: DateTime<Utc>, consecutive_violations: u32) -> Self {
        Self {
            attempts: 0,
            window_start: now,
            locked_until: None,
            consecutive_violations,
        }
    }
}

/// In-process rate limiter
///
/// State lives only in memory; restarting the server clears all counters.
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<RwLock<HashMap<String, RateLimitAttempt>>>,
    configs: Arc<HashMap<String, RateLimitConfig>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Create a rate limiter with the login configuration
    pub fn new() -> Self {
        Self::with_configs([(LOGIN_ENDPOINT.to_string(), RateLimitConfig::login())])
    }

    /// Create a rate limiter with explicit endpoint configurations
    pub fn with_configs(configs: impl IntoIterator<Item = (String, RateLimitConfig)>) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            configs: Arc::new(configs.into_iter().collect()),
        }
    }

    /// Atomically check rate limit and record attempt
    ///
    /// Check and increment happen under one write lock, so concurrent
    /// requests cannot all pass the check before any of them is counted.
    ///
    /// # Errors
    ///
    /// * `RateLimitError::InvalidEndpoint` - No configuration for `endpoint`
    pub async fn check_and_record(
        &self,
        endpoint: &str,
        identifier: &str,
    ) -> RateLimiterResult<RateLimitResult> {
        let config = self
            .configs
            .get(endpoint)
            .ok_or_else(|| RateLimitError::InvalidEndpoint(endpoint.to_string()))?;

        let key = format!("{}:{}", endpoint, identifier);
        let now = Utc::now();

        let mut cache = self.cache.write().await;
        let attempt = cache
            .entry(key)
            .or_insert_with(|| RateLimitAttempt::fresh(now, 0));

        if let Some(locked_until) = attempt.locked_until
            && now < locked_until
        {
            let retry_after = (locked_until - now).num_seconds().max(1) as u64;
            return Ok(RateLimitResult::Locked { retry_after });
        }

        // Window expired: start over, remembering earlier violations so the
        // next lockout backs off further
        let window = Duration::seconds(config.window_secs as i64);
        if now - attempt.window_start > window || attempt.locked_until.is_some() {
            *attempt = RateLimitAttempt::fresh(now, attempt.consecutive_violations);
        }

        if attempt.attempts >= config.max_attempts {
            let lockout = config.lockout_for(attempt.consecutive_violations);
            attempt.locked_until = Some(now + Duration::seconds(lockout as i64));
            attempt.consecutive_violations += 1;

            log::warn!(
                "Rate limit exceeded on {} for {}, locked for {}s",
                endpoint,
                identifier,
                lockout
            );
            return Ok(RateLimitResult::Locked {
                retry_after: lockout,
            });
        }

        attempt.attempts += 1;
        Ok(RateLimitResult::Allowed {
            remaining: config.max_attempts - attempt.attempts,
        })
    }

    /// Reset rate limit for an identifier, e.g. after a successful login
    pub async fn reset(&self, endpoint: &str, identifier: &str) {
        let key = format!("{}:{}", endpoint, identifier);
        self.cache.write().await.remove(&key);
    }

    /// Drop records whose window and lockout have both passed
    ///
    /// Records that carry violations are kept until their lockout ends, so
    /// backoff history survives for one lockout period.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut cache = self.cache.write().await;
        let before = cache.len();

        cache.retain(|key, attempt| {
            let endpoint = key.split_once(':').map_or(key.as_str(), |(e, _)| e);
            let Some(config) = self.configs.get(endpoint) else {
                return false;
            };
            let window_live =
                now - attempt.window_start <= Duration::seconds(config.window_secs as i64);
            let lock_live = attempt.locked_until.is_some_and(|until| now < until);
            window_live || lock_live
        });

        before - cache.len()
    }

    /// Number of tracked identifiers
    pub async fn tracked(&self) -> usize {
        self.cache.read().await.len()
    }
}

/// Rate limit check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Action is allowed
    Allowed { remaining: u32 },

    /// Action is blocked due to rate limit
    Locked { retry_after: u64 },
}

impl RateLimitResult {
    /// Check if action is allowed
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }

    /// Get remaining attempts (if allowed)
    pub fn remaining(&self) -> Option<u32> {
        match self {
            RateLimitResult::Allowed { remaining } => Some(*remaining),
            _ => None,
        }
    }

    /// Get retry after seconds (if locked)
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            RateLimitResult::Locked { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
