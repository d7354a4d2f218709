//! Mapping of account errors onto HTTP responses.
//!
//! Every failure is rendered as
//! `{"success": false, "error": ..., "field"?: ..., "retryAfter"?: ...}`.
//! Internal failures are logged with their detail and returned with a
//! sanitized message.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use school_portal::auth::AuthError;
use serde::Serialize;

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Handler error
#[derive(Debug)]
pub enum ApiError {
    /// Domain error from the account library
    Auth(AuthError),
    /// Request body, path or query string could not be parsed. `field` names
    /// which part of the request was rejected.
    BadRequest { field: &'static str, message: String },
    /// Server-side failure outside the account library
    Internal(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest {
            field: "body",
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest {
            field: "path",
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest {
            field: "query",
            message: rejection.body_text(),
        }
    }
}

/// HTTP status for an account error
pub fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::Validation { .. } | AuthError::InvalidUsername(_) | AuthError::WeakPassword(_) => {
            StatusCode::BAD_REQUEST
        }
        AuthError::InvalidCredentials
        | AuthError::Unauthorized
        | AuthError::TokenExpired
        | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
        AuthError::Forbidden => StatusCode::FORBIDDEN,
        AuthError::AccountNotFound => StatusCode::NOT_FOUND,
        AuthError::Conflict(_) => StatusCode::CONFLICT,
        AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        AuthError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Database(_)
        | AuthError::HashingFailed
        | AuthError::Jwt(_)
        | AuthError::QrCode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Auth(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    tracing::error!(error = %err, "Request failed");
                }
                let field = match &err {
                    AuthError::Validation { field, .. } => Some(field.clone()),
                    AuthError::Conflict(field) => Some(field.clone()),
                    AuthError::InvalidUsername(_) => Some("username".to_string()),
                    AuthError::WeakPassword(_) => Some("password".to_string()),
                    _ => None,
                };
                let retry_after = match &err {
                    AuthError::RateLimited { retry_after } => Some(*retry_after),
                    _ => None,
                };
                (
                    status,
                    ErrorResponse {
                        success: false,
                        error: err.client_message(),
                        field,
                        retry_after,
                    },
                )
            }
            ApiError::BadRequest { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    success: false,
                    error: message,
                    field: Some(field.to_string()),
                    retry_after: None,
                },
            ),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        success: false,
                        error: "Internal server error".to_string(),
                        field: None,
                        retry_after: None,
                    },
                )
            }
        };

        let retry_header = body
            .retry_after
            .and_then(|secs| HeaderValue::from_str(&secs.to_string()).ok());

        let mut response = (status, Json(body)).into_response();
        if let Some(value) = retry_header {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        response
    }
}
