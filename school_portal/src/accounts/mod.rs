//! Account lifecycle management.
//!
//! Students are registered with generated credentials; controllers manage
//! them. Every operation goes through the injected
//! [`AccountRepository`](crate::db::AccountRepository).

pub mod manager;
pub mod validation;

pub use manager::{AccountManager, MAX_USERNAME_ATTEMPTS};
pub use validation::{normalize_email, validate_new_student, validate_profile_update};
