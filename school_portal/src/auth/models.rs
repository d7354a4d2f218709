//! Account and authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account ID type
pub type AccountId = i64;

/// Account role. Each role lives in its own store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    #[serde(alias = "primary")]
    Controller,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Controller => "controller",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "controller" | "primary" => Ok(Role::Controller),
            other => Err(format!("{other:?} is not a valid role")),
        }
    }
}

/// Student profile fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub name: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub division: String,
    pub parent_name: String,
    pub place: String,
}

/// Controller profile fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerProfile {
    pub name: String,
}

/// Role-specific profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Profile {
    Student(StudentProfile),
    Controller(ControllerProfile),
}

impl Profile {
    pub fn role(&self) -> Role {
        match self {
            Profile::Student(_) => Role::Student,
            Profile::Controller(_) => Role::Controller,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Profile::Student(p) => &p.name,
            Profile::Controller(p) => &p.name,
        }
    }
}

/// Stored account, including the password hash.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub qr_token: String,
    pub profile: Profile,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl Account {
    pub fn role(&self) -> Role {
        self.profile.role()
    }
}

/// Account ready to be inserted; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub qr_token: String,
    pub profile: Profile,
}

impl NewAccount {
    pub fn role(&self) -> Role {
        self.profile.role()
    }
}

/// Client-facing view of an account. Never carries the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: AccountId,
    pub role: Role,
    pub username: String,
    pub email: String,
    pub name: String,
    #[serde(rename = "class", skip_serializing_if = "Option::is_none", default)]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub division: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub place: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&Account> for UserView {
    fn from(account: &Account) -> Self {
        let (class_name, division, parent_name, place) = match &account.profile {
            Profile::Student(p) => (
                Some(p.class_name.clone()),
                Some(p.division.clone()),
                Some(p.parent_name.clone()),
                Some(p.place.clone()),
            ),
            Profile::Controller(_) => (None, None, None, None),
        };

        Self {
            id: account.id,
            role: account.role(),
            username: account.username.clone(),
            email: account.email.clone(),
            name: account.profile.name().to_string(),
            class_name,
            division,
            parent_name,
            place,
            is_active: account.is_active,
            created_at: account.created_at,
            last_login: account.last_login,
        }
    }
}

/// Student registration request
///
/// Missing fields deserialize as empty strings so they are reported as
/// field-level validation errors instead of body rejections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewStudent {
    pub name: String,
    pub email: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub division: String,
    pub parent_name: String,
    pub place: String,
}

/// Controller creation request
#[derive(Debug, Clone)]
pub struct NewController {
    pub username: String,
    pub email: String,
    pub name: String,
    pub password: String,
}

/// Password login request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
    pub role: Role,
}

impl LoginRequest {
    /// Username takes precedence over email when both are sent.
    pub fn identifier(&self) -> Option<&str> {
        non_blank(&self.username).or_else(|| non_blank(&self.email))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// QR-code login request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QrLoginRequest {
    pub qr_token: String,
    pub role: Role,
}

/// Mutable profile fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    #[serde(rename = "class")]
    pub class_name: Option<String>,
    pub division: Option<String>,
    pub parent_name: Option<String>,
    pub place: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.class_name.is_none()
            && self.division.is_none()
            && self.parent_name.is_none()
            && self.place.is_none()
    }
}

/// Password change request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

/// JWT claims for session tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: AccountId,
    pub role: Role,
    pub username: String,
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

/// Successful login
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserView,
}

/// Registration result. `password` is the only copy of the plaintext.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredStudent {
    pub id: AccountId,
    pub name: String,
    pub username: String,
    pub password: String,
    pub email: String,
    pub qr_token: String,
    pub qr_code_image: String,
    pub email_sent: bool,
}

/// Result of a controller-initiated password reset
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordReset {
    pub id: AccountId,
    pub username: String,
    pub password: String,
    pub email_sent: bool,
}
