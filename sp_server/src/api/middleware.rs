//! Authentication middleware for protected endpoints.
//!
//! Extracts the session token from the `Authorization: Bearer <token>`
//! header, verifies it with the [`AuthManager`](school_portal::auth::AuthManager)
//! and injects the decoded [`AccessTokenClaims`] into request extensions.
//!
//! # Extracting Claims
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use school_portal::auth::AccessTokenClaims;
//!
//! async fn protected_handler(Extension(claims): Extension<AccessTokenClaims>) -> String {
//!     format!("Authenticated as {} {}", claims.role, claims.sub)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use school_portal::auth::{AccessTokenClaims, AuthError};

use super::{AppState, error::ApiError};
use crate::logging::log_security_event;

/// Authentication middleware that validates session tokens and injects claims.
///
/// # Behavior
///
/// - **Success**: Token valid, claims inserted, next handler called
/// - **Missing header or bad format**: `401` "Authentication required"
/// - **Expired token**: `401` "Session expired"
/// - **Bad signature or revoked token**: `401` "Invalid session token"
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).ok_or(AuthError::Unauthorized)?;

    let claims = state
        .auth_manager
        .verify_access_token(token)
        .await
        .inspect_err(|e| {
            if matches!(e, AuthError::InvalidToken) {
                log_security_event("invalid_token", None, None, "Rejected session token");
            }
        })?;

    request.extensions_mut().insert::<AccessTokenClaims>(claims);
    Ok(next.run(request).await)
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
