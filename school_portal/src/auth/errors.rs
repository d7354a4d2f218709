//! Authentication error types.

use crate::db::timeouts::TimeoutError;
use thiserror::Error;

/// Authentication and account errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database operation exceeded its deadline
    #[error("Database operation timed out")]
    Timeout,

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Malformed or missing input
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Unknown identifier, wrong password, inactive account or unknown QR token.
    /// Deliberately indistinguishable to callers.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Unique field already taken
    #[error("An account with this {0} already exists")]
    Conflict(String),

    /// Invalid username format
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// Password too weak
    #[error("Password too weak: {0}")]
    WeakPassword(String),

    /// Missing session token
    #[error("Authentication required")]
    Unauthorized,

    /// Session token past its expiry
    #[error("Session expired")]
    TokenExpired,

    /// Bad signature, malformed or revoked token
    #[error("Invalid session token")]
    InvalidToken,

    /// JWT encoding error
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Caller lacks the required role
    #[error("Insufficient permissions")]
    Forbidden,

    /// Account not found
    #[error("Account not found")]
    AccountNotFound,

    /// QR code rendering failed
    #[error("QR code generation failed: {0}")]
    QrCode(String),

    /// Rate limited
    #[error("Too many attempts, please try again later")]
    RateLimited { retry_after: u64 },
}

impl AuthError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AuthError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Database, JWT and rendering errors are sanitized to prevent information
    /// disclosure about the internal system structure.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Database(_)
            | AuthError::Timeout
            | AuthError::HashingFailed
            | AuthError::QrCode(_) => "Internal server error".to_string(),
            AuthError::Jwt(_) => "Authentication failed".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether the caller should re-authenticate
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::Unauthorized | AuthError::TokenExpired | AuthError::InvalidToken
        )
    }
}

impl From<TimeoutError> for AuthError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Timeout(_) => AuthError::Timeout,
            TimeoutError::Database(e) => AuthError::Database(e),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_client_message_sanitizes_internal_errors() {
        let err = AuthError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.client_message(), "Internal server error");

        let err = AuthError::from(TimeoutError::Timeout(Duration::from_secs(5)));
        assert!(matches!(err, AuthError::Timeout));
        assert_eq!(err.client_message(), "Internal server error");
    }

    #[test]
    fn test_conflict_message_names_field() {
        let err = AuthError::Conflict("email".to_string());
        assert_eq!(err.client_message(), "An account with this email already exists");
    }

    #[test]
    fn test_unauthorized_family() {
        assert!(AuthError::TokenExpired.is_unauthorized());
        assert!(AuthError::InvalidToken.is_unauthorized());
        assert!(!AuthError::InvalidCredentials.is_unauthorized());
    }
}
