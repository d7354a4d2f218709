//! Student management for controllers.
//!
//! Every handler here answers `403 Forbidden` to a student token.

use axum::{
    Json,
    extract::{
        Extension, Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
};
use school_portal::auth::{AccessTokenClaims, AccountId, PasswordReset, UserView};
use serde::{Deserialize, Serialize};

use super::{AppState, account::UserResponse, error::ApiError};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListStudentsQuery {
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct StudentsResponse {
    pub success: bool,
    pub students: Vec<UserView>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub success: bool,
    #[serde(flatten)]
    pub reset: PasswordReset,
}

/// List students, active ones only unless `includeInactive=true`
pub async fn list_students(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessTokenClaims>,
    query: Result<Query<ListStudentsQuery>, QueryRejection>,
) -> Result<Json<StudentsResponse>, ApiError> {
    let Query(query) = query?;
    let students = state
        .account_manager
        .list_students(&claims, query.include_inactive.unwrap_or(false))
        .await?;

    Ok(Json(StudentsResponse {
        success: true,
        students,
    }))
}

/// Soft-deactivate a student. Their existing sessions stop working.
pub async fn deactivate_student(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessTokenClaims>,
    id: Result<Path<AccountId>, PathRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Path(id) = id?;
    let user = state
        .account_manager
        .set_student_active(&claims, id, false)
        .await?;
    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

pub async fn activate_student(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessTokenClaims>,
    id: Result<Path<AccountId>, PathRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Path(id) = id?;
    let user = state
        .account_manager
        .set_student_active(&claims, id, true)
        .await?;
    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

/// Issue a fresh generated password and mail it to the student.
///
/// The response carries the plaintext once so the controller can hand it
/// over when mail delivery failed (`emailSent: false`).
pub async fn reset_student_password(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessTokenClaims>,
    id: Result<Path<AccountId>, PathRejection>,
) -> Result<Json<ResetResponse>, ApiError> {
    let Path(id) = id?;
    let reset = state
        .account_manager
        .reset_student_password(&claims, id)
        .await?;
    Ok(Json(ResetResponse {
        success: true,
        reset,
    }))
}
