//! Registration and session API handlers.
//!
//! # Examples
//!
//! Register a student:
//! ```bash
//! curl -X POST http://localhost:8080/register \
//!   -H "Content-Type: application/json" \
//!   -d '{"name":"Ahmed Hassan","email":"ahmed@example.com","class":"10","division":"A","parentName":"Ali","place":"City"}'
//! ```
//!
//! Login:
//! ```bash
//! curl -X POST http://localhost:8080/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"username":"ahmedhassan4821","password":"Ahme123456","role":"student"}'
//! ```

use axum::{
    Json,
    extract::{Extension, State, rejection::JsonRejection},
};
use school_portal::{
    auth::{
        AccessTokenClaims, AuthError, LoginOutcome, LoginRequest, NewStudent, QrLoginRequest,
        RegisteredStudent, Role,
    },
    security::{LOGIN_ENDPOINT, RateLimitResult},
};
use serde::Serialize;

use super::{AppState, error::ApiError, request_id::RequestId};
use crate::{logging::log_security_event, metrics};

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub student: RegisteredStudent,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: LoginOutcome,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// Register a student with generated credentials.
///
/// # Request Body
///
/// ```json
/// {
///   "name": "Ahmed Hassan",
///   "email": "ahmed@example.com",
///   "class": "10",
///   "division": "A",
///   "parentName": "Ali",
///   "place": "City"
/// }
/// ```
///
/// # Response
///
/// `200 OK` with the issued credentials. `password` is plaintext and is not
/// retrievable afterwards.
///
/// ```json
/// {
///   "success": true,
///   "student": {
///     "id": 1,
///     "name": "Ahmed Hassan",
///     "username": "ahmedhassan4821",
///     "password": "Ahme123456",
///     "email": "ahmed@example.com",
///     "qrToken": "9f86d081...",
///     "qrCodeImage": "data:image/svg+xml;base64,...",
///     "emailSent": true
///   }
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Missing field or malformed email
/// - `409 Conflict`: Email already registered
pub async fn register(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<NewStudent>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let Json(input) = payload?;

    match state.account_manager.register_student(input).await {
        Ok(student) => {
            metrics::registrations_total("success");
            if !student.email_sent {
                metrics::mail_failures_total("welcome");
            }
            tracing::info!(
                request_id = request_id.as_str(),
                student_id = student.id,
                "Student registered"
            );
            Ok(Json(RegisterResponse {
                success: true,
                student,
            }))
        }
        Err(e) => {
            metrics::registrations_total(match e {
                AuthError::Conflict(_) => "conflict",
                AuthError::Validation { .. } => "invalid",
                _ => "error",
            });
            Err(e.into())
        }
    }
}

/// Authenticate with username or email and password.
///
/// # Request Body
///
/// ```json
/// { "username": "ahmedhassan4821", "password": "Ahme123456", "role": "student" }
/// ```
///
/// `email` may be sent instead of `username`. `role` defaults to `student`;
/// `primary` is accepted as an alias of `controller`.
///
/// # Response
///
/// ```json
/// { "success": true, "token": "eyJhbGciOiJIUzI1NiIs...", "expiresAt": "...", "user": { ... } }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Missing identifier or password
/// - `401 Unauthorized`: Invalid credentials (never says which part was wrong)
/// - `429 Too Many Requests`: Too many failed attempts for this identifier
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(request) = payload?;
    let role = request.role;

    let limiter_key = request
        .identifier()
        .map(|identifier| limiter_key(role, identifier));

    if let Some(key) = &limiter_key {
        throttle(&state, key).await?;
    }

    match state.auth_manager.login(request).await {
        Ok(outcome) => {
            if let Some(key) = &limiter_key {
                state.login_limiter.reset(LOGIN_ENDPOINT, key).await;
            }
            metrics::login_attempts_total(role.as_str(), "password", "success");
            Ok(Json(LoginResponse {
                success: true,
                outcome,
            }))
        }
        Err(e) => {
            if matches!(e, AuthError::InvalidCredentials) {
                log_security_event(
                    "failed_login",
                    None,
                    limiter_key.as_deref(),
                    "Invalid credentials",
                );
                metrics::login_attempts_total(role.as_str(), "password", "failure");
            }
            Err(e.into())
        }
    }
}

/// Authenticate with a QR token.
///
/// # Request Body
///
/// ```json
/// { "qrToken": "9f86d081...", "role": "student" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Missing token
/// - `401 Unauthorized`: Token does not match an active account of the role
pub async fn login_qr(
    State(state): State<AppState>,
    payload: Result<Json<QrLoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(request) = payload?;
    let role = request.role;

    match state.auth_manager.login_qr(request).await {
        Ok(outcome) => {
            metrics::login_attempts_total(role.as_str(), "qr", "success");
            Ok(Json(LoginResponse {
                success: true,
                outcome,
            }))
        }
        Err(e) => {
            if matches!(e, AuthError::InvalidCredentials) {
                log_security_event("failed_qr_login", None, None, "Unknown QR token");
                metrics::login_attempts_total(role.as_str(), "qr", "failure");
            }
            Err(e.into())
        }
    }
}

/// Revoke the presented session token.
///
/// The token stops working immediately; other sessions of the same account
/// are unaffected.
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessTokenClaims>,
) -> Json<MessageResponse> {
    state.auth_manager.logout(&claims).await;
    Json(MessageResponse {
        success: true,
        message: "Logged out".to_string(),
    })
}

/// Count a login attempt against the identifier's budget
async fn throttle(state: &AppState, key: &str) -> Result<(), ApiError> {
    let result = state
        .login_limiter
        .check_and_record(LOGIN_ENDPOINT, key)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    match result {
        RateLimitResult::Allowed { .. } => Ok(()),
        RateLimitResult::Locked { retry_after } => {
            log_security_event(
                "login_lockout",
                None,
                Some(key),
                &format!("Login locked for {retry_after}s"),
            );
            metrics::rate_limit_hits_total(LOGIN_ENDPOINT);
            Err(AuthError::RateLimited { retry_after }.into())
        }
    }
}

/// Login limiter key: failures are counted per role and identifier
pub fn limiter_key(role: Role, identifier: &str) -> String {
    format!("{}:{}", role, identifier.to_lowercase())
}
