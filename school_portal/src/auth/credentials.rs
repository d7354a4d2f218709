//! Credential issuance: usernames, generated passwords, QR tokens and hashing.

use super::errors::{AuthError, AuthResult};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::{Rng, RngCore};
use std::ops::RangeInclusive;
use std::sync::{Arc, OnceLock};

/// Numeric suffix appended to derived usernames
pub const USERNAME_SUFFIX_RANGE: RangeInclusive<u32> = 1000..=9999;

/// Random digits appended to generated passwords
pub const PASSWORD_DIGITS: usize = 6;

/// Letters of the name reused as the password prefix
pub const PASSWORD_PREFIX_LEN: usize = 4;

/// Longest username stem; with the 4-digit suffix it fits `VARCHAR(64)`
pub const MAX_USERNAME_STEM_LEN: usize = 60;

/// Random bytes in a QR token (hex-encoded, so twice as many characters)
pub const QR_TOKEN_BYTES: usize = 32;

const FALLBACK_USERNAME_STEM: &str = "student";
const FALLBACK_PASSWORD_PREFIX: &str = "Stud";

/// Generates and protects account secrets.
///
/// The pepper is appended to every password before Argon2id hashing, so a
/// leaked database alone is not enough to mount an offline attack.
#[derive(Clone)]
pub struct CredentialIssuer {
    pepper: String,
    /// Hash of a random password, verified against when the account is unknown
    dummy_hash: Arc<OnceLock<Option<String>>>,
}

impl CredentialIssuer {
    pub fn new(pepper: String) -> Self {
        Self {
            pepper,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    /// Derive a username candidate from a display name.
    ///
    /// Not unique by itself: callers re-check the store and regenerate on
    /// collision.
    pub fn derive_username(&self, name: &str) -> String {
        let mut stem: String = normalize_name(name)
            .chars()
            .take(MAX_USERNAME_STEM_LEN)
            .collect();
        if stem.is_empty() {
            stem = FALLBACK_USERNAME_STEM.to_string();
        }
        let suffix = rand::rng().random_range(USERNAME_SUFFIX_RANGE);
        format!("{stem}{suffix}")
    }

    /// Generate a plaintext password: name-derived prefix plus random digits.
    pub fn generate_password(&self, name: &str) -> String {
        let letters: String = normalize_name(name)
            .chars()
            .filter(|c| c.is_alphabetic())
            .take(PASSWORD_PREFIX_LEN)
            .collect();

        let mut password = if letters.is_empty() {
            FALLBACK_PASSWORD_PREFIX.to_string()
        } else {
            capitalize(&letters)
        };

        let mut rng = rand::rng();
        for _ in 0..PASSWORD_DIGITS {
            password.push(char::from(b'0' + rng.random_range(0..10u8)));
        }
        password
    }

    /// Generate an opaque QR login token
    pub fn generate_qr_token(&self) -> String {
        let mut bytes = [0u8; QR_TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Hash password with Argon2id + pepper
    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        Ok(argon2
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AuthError::HashingFailed)?
            .to_string())
    }

    /// Spend one Argon2 verification that cannot succeed.
    ///
    /// Login runs this when the identifier matches no account, so an unknown
    /// username costs as much as a wrong password.
    pub fn verify_against_dummy(&self, password: &str) {
        let dummy = self
            .dummy_hash
            .get_or_init(|| self.hash_password(&self.generate_qr_token()).ok());
        if let Some(hash) = dummy {
            let _ = self.verify_password(password, hash);
        }
    }

    #[cfg(test)]
    pub(crate) fn dummy_hash_ready(&self) -> bool {
        self.dummy_hash.get().is_some_and(Option::is_some)
    }

    /// Verify password against hash
    ///
    /// Any failure, including an unparsable stored hash, is reported as
    /// `InvalidCredentials`.
    pub fn verify_password(&self, password: &str, hash: &str) -> AuthResult<()> {
        let peppered = format!("{}{}", password, self.pepper);
        let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
        let argon2 = Argon2::default();

        argon2
            .verify_password(peppered.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)
    }
}

/// Lowercase the name and keep only alphanumeric characters.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Validate a chosen username (controllers pick their own)
pub fn validate_username(username: &str) -> AuthResult<()> {
    let len = username.chars().count();
    if !(3..=20).contains(&len) {
        return Err(AuthError::InvalidUsername(
            "Username must be 3-20 characters".to_string(),
        ));
    }

    if !username.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(AuthError::InvalidUsername(
            "Username can only contain letters, numbers, and underscores".to_string(),
        ));
    }

    Ok(())
}

/// Validate strength of a user-chosen password
pub fn validate_password_strength(password: &str) -> AuthResult<()> {
    if password.len() < 8 {
        return Err(AuthError::WeakPassword(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());

    if !has_digit || !has_uppercase || !has_lowercase {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one number, one uppercase and one lowercase letter"
                .to_string(),
        ));
    }

    Ok(())
}
