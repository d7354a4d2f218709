//! # School Portal
//!
//! Account registration and authentication for a school portal.
//!
//! Students are registered by staff with generated credentials: a
//! name-derived username, a random password returned exactly once, and an
//! opaque QR token that works as an alternate login key. Controllers
//! (administrative staff) manage student accounts. Both roles log in with a
//! password or QR token and receive a signed session token.
//!
//! ## Core Modules
//!
//! - [`auth`]: Credential issuance, login, session tokens and revocation
//! - [`accounts`]: Registration, profile maintenance and controller operations
//! - [`db`]: Account store (Postgres and in-memory) behind one trait
//! - [`mail`]: Credential delivery by email
//! - [`security`]: Login rate limiting
//!
//! ## Example
//!
//! ```
//! use school_portal::{
//!     accounts::AccountManager,
//!     auth::{CredentialIssuer, NewStudent},
//!     db::InMemoryAccountRepository,
//!     mail::LogMailer,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let accounts = AccountManager::new(
//!         Arc::new(InMemoryAccountRepository::new()),
//!         CredentialIssuer::new("example_pepper_value".to_string()),
//!         Arc::new(LogMailer::new()),
//!     );
//!
//!     let student = accounts
//!         .register_student(NewStudent {
//!             name: "Ahmed Hassan".to_string(),
//!             email: "ahmed@example.com".to_string(),
//!             class_name: "10".to_string(),
//!             division: "A".to_string(),
//!             parent_name: "Ali".to_string(),
//!             place: "City".to_string(),
//!         })
//!         .await?;
//!
//!     assert!(student.username.starts_with("ahmedhassan"));
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod auth;
pub mod db;
pub mod mail;
pub mod security;
