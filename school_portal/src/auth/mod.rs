//! Authentication: credential issuance, login and session validation.
//!
//! - Argon2id password hashing with server-side pepper
//! - Generated usernames and passwords for students
//! - Opaque QR tokens as an alternate login key
//! - HS256 session tokens with a fixed lifetime and logout revocation
//!
//! ## Example
//!
//! ```no_run
//! use school_portal::auth::{AuthManager, CredentialIssuer, LoginRequest, Role, TokenDenylist};
//! use school_portal::db::InMemoryAccountRepository;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let auth = AuthManager::new(
//!         Arc::new(InMemoryAccountRepository::new()),
//!         CredentialIssuer::new("secret_pepper".to_string()),
//!         Arc::new(TokenDenylist::new()),
//!         "jwt_secret".to_string(),
//!     );
//!
//!     let outcome = auth
//!         .login(LoginRequest {
//!             username: Some("ahmedhassan4821".to_string()),
//!             email: None,
//!             password: "Ahme123456".to_string(),
//!             role: Role::Student,
//!         })
//!         .await?;
//!     println!("Session token: {}", outcome.token);
//!     Ok(())
//! }
//! ```

pub mod credentials;
pub mod errors;
pub mod manager;
pub mod models;
pub mod qr;
pub mod revocation;

pub use credentials::CredentialIssuer;
pub use errors::{AuthError, AuthResult};
pub use manager::{AuthManager, DEFAULT_TOKEN_TTL_MINUTES};
pub use models::{
    AccessTokenClaims, Account, AccountId, ControllerProfile, LoginOutcome, LoginRequest,
    NewAccount, NewController, NewStudent, PasswordChange, PasswordReset, Profile, ProfileUpdate,
    QrLoginRequest, RegisteredStudent, Role, StudentProfile, UserView,
};
pub use qr::QrPayload;
pub use revocation::TokenDenylist;
