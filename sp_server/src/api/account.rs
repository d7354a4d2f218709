//! The caller's own profile and password.

use axum::{
    Json,
    extract::{Extension, State, rejection::JsonRejection},
};
use school_portal::auth::{AccessTokenClaims, PasswordChange, ProfileUpdate, UserView};
use serde::Serialize;

use super::{AppState, auth::MessageResponse, error::ApiError};

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: UserView,
}

/// Current profile, read fresh from the store
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessTokenClaims>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.account_manager.profile(&claims).await?;
    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

/// Update mutable profile fields.
///
/// Students may change `name`, `class`, `division`, `parentName` and `place`;
/// controllers only `name`. Omitted fields are left untouched.
///
/// # Errors
///
/// - `400 Bad Request`: Blank value or a field the role cannot change
/// - `401 Unauthorized`: Account no longer active
pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessTokenClaims>,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Json(update) = payload?;
    let user = state.account_manager.update_profile(&claims, update).await?;
    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

/// Change the caller's password.
///
/// # Request Body
///
/// ```json
/// { "currentPassword": "Ahme123456", "newPassword": "N3w-Passw0rd" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: New password too weak
/// - `401 Unauthorized`: Current password wrong
pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessTokenClaims>,
    payload: Result<Json<PasswordChange>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(change) = payload?;
    state.account_manager.change_password(&claims, change).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Password changed".to_string(),
    }))
}
