//! Structured logging configuration.
//!
//! The library crate logs through the `log` facade; its records reach the
//! tracing subscriber installed here through the `tracing-log` bridge.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging
///
/// Log levels come from `RUST_LOG`, defaulting to `info,sqlx=warn,hyper=warn`.
///
/// # Example
///
/// ```no_run
/// use sp_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log security event with structured data
///
/// # Arguments
///
/// * `event_type` - Type of security event
/// * `account_id` - Optional account ID
/// * `identifier` - Optional login identifier (username or email)
/// * `message` - Event message
///
/// # Example
///
/// ```
/// use sp_server::logging::log_security_event;
///
/// log_security_event(
///     "failed_login",
///     None,
///     Some("ahmedhassan4821"),
///     "Invalid credentials"
/// );
/// ```
pub fn log_security_event(
    event_type: &str,
    account_id: Option<i64>,
    identifier: Option<&str>,
    message: &str,
) {
    tracing::warn!(
        event_type = event_type,
        account_id = account_id,
        identifier = identifier,
        "SECURITY: {}",
        message
    );
}

/// Log a completed request. Server errors are raised to `warn`.
pub fn log_api_request(
    request_id: &str,
    method: &str,
    route: &str,
    status_code: u16,
    duration_ms: u64,
) {
    if status_code >= 500 {
        tracing::warn!(
            request_id,
            http_method = method,
            http_route = route,
            http_status = status_code,
            duration_ms,
            "Request failed"
        );
    } else {
        tracing::info!(
            request_id,
            http_method = method,
            http_route = route,
            http_status = status_code,
            duration_ms,
            "Request completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_security_event() {
        // Just ensure it doesn't panic
        log_security_event("failed_login", None, Some("student1234"), "Test message");
        log_security_event("login_lockout", Some(7), None, "Test message");
    }

    #[test]
    fn test_log_api_request() {
        log_api_request("req-1", "GET", "/me", 200, 45);
        log_api_request("req-2", "POST", "/login", 401, 120);
        log_api_request("req-3", "POST", "/register", 503, 5000);
    }
}
