//! Authenticator and session validator.

use super::{
    credentials::CredentialIssuer,
    errors::{AuthError, AuthResult},
    models::{
        AccessTokenClaims, Account, LoginOutcome, LoginRequest, QrLoginRequest, Role, UserView,
    },
    revocation::TokenDenylist,
};
use crate::db::AccountRepository;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Default session lifetime
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 24 * 60;

/// Authentication manager
///
/// Verifies credentials against the account store and issues HS256 session
/// tokens. Token validation is stateless apart from the injected denylist.
#[derive(Clone)]
pub struct AuthManager {
    accounts: Arc<dyn AccountRepository>,
    issuer: CredentialIssuer,
    denylist: Arc<TokenDenylist>,
    jwt_secret: String,
    token_ttl: Duration,
}

impl AuthManager {
    /// Create a new authentication manager
    ///
    /// # Arguments
    ///
    /// * `accounts` - Account store
    /// * `issuer` - Credential issuer holding the password pepper
    /// * `denylist` - Revoked token ids
    /// * `jwt_secret` - Secret key for JWT signing
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        issuer: CredentialIssuer,
        denylist: Arc<TokenDenylist>,
        jwt_secret: String,
    ) -> Self {
        Self {
            accounts,
            issuer,
            denylist,
            jwt_secret,
            token_ttl: Duration::minutes(DEFAULT_TOKEN_TTL_MINUTES),
        }
    }

    /// Override the session lifetime
    pub fn with_token_ttl(mut self, token_ttl: Duration) -> Self {
        self.token_ttl = token_ttl;
        self
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Login with username or email and password
    ///
    /// The identifier is matched against usernames first, then emails, within
    /// the requested role only.
    ///
    /// # Errors
    ///
    /// * `AuthError::Validation` - No identifier or empty password
    /// * `AuthError::InvalidCredentials` - Unknown identifier, wrong password
    ///   or inactive account
    pub async fn login(&self, request: LoginRequest) -> AuthResult<LoginOutcome> {
        let identifier = request
            .identifier()
            .ok_or_else(|| AuthError::validation("username", "Username or email is required"))?;
        if request.password.is_empty() {
            return Err(AuthError::validation("password", "Password is required"));
        }

        let account = match self
            .accounts
            .find_by_username(request.role, identifier)
            .await?
        {
            Some(account) => Some(account),
            None => {
                self.accounts
                    .find_by_email(request.role, &identifier.to_lowercase())
                    .await?
            }
        };

        let Some(account) = account else {
            self.issuer.verify_against_dummy(&request.password);
            log::debug!("Login failed: unknown {} identifier", request.role);
            return Err(AuthError::InvalidCredentials);
        };

        self.issuer
            .verify_password(&request.password, &account.password_hash)
            .inspect_err(|_| {
                log::debug!("Login failed: password mismatch for {} {}", account.role(), account.id)
            })?;

        self.complete_login(account).await
    }

    /// Login with a QR token
    ///
    /// A token matching exactly one stored account of the role is treated as a
    /// credential-equivalent success.
    pub async fn login_qr(&self, request: QrLoginRequest) -> AuthResult<LoginOutcome> {
        let qr_token = request.qr_token.trim();
        if qr_token.is_empty() {
            return Err(AuthError::validation("qrToken", "QR token is required"));
        }

        let account = self
            .accounts
            .find_by_qr_token(request.role, qr_token)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !bool::from(account.qr_token.as_bytes().ct_eq(qr_token.as_bytes())) {
            return Err(AuthError::InvalidCredentials);
        }

        self.complete_login(account).await
    }

    async fn complete_login(&self, account: Account) -> AuthResult<LoginOutcome> {
        if !account.is_active {
            log::warn!(
                "Login rejected for inactive {} account {}",
                account.role(),
                account.id
            );
            return Err(AuthError::InvalidCredentials);
        }

        self.accounts
            .record_login(account.role(), account.id)
            .await?;

        let (token, expires_at) = self.issue_token(&account)?;
        let mut user = UserView::from(&account);
        user.last_login = Some(Utc::now());

        log::info!("{} {} logged in", account.role(), account.id);

        Ok(LoginOutcome {
            token,
            expires_at,
            user,
        })
    }

    /// Issue a signed session token for an account
    pub fn issue_token(&self, account: &Account) -> AuthResult<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + self.token_ttl;
        let claims = AccessTokenClaims {
            sub: account.id,
            role: account.role(),
            username: account.username.clone(),
            jti: Uuid::new_v4().to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        Ok((token, expires_at))
    }

    /// Verify a session token
    ///
    /// # Errors
    ///
    /// * `AuthError::TokenExpired` - Past its `exp`
    /// * `AuthError::InvalidToken` - Bad signature, malformed or revoked
    pub async fn verify_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data = decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?;

        if self.denylist.is_revoked(&token_data.claims.jti).await {
            return Err(AuthError::InvalidToken);
        }

        Ok(token_data.claims)
    }

    /// Revoke the presented token until its natural expiry
    pub async fn logout(&self, claims: &AccessTokenClaims) {
        let expires_at = DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);
        self.denylist.revoke(&claims.jti, expires_at).await;
        log::info!("{} {} logged out", claims.role, claims.sub);
    }

    /// Require a specific role on verified claims
    pub fn require_role(claims: &AccessTokenClaims, role: Role) -> AuthResult<()> {
        if claims.role == role {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{NewAccount, Profile, StudentProfile};
    use crate::db::InMemoryAccountRepository;

    const SECRET: &str = "unit_test_jwt_secret_with_32_chars!!";

    async fn setup() -> (AuthManager, Arc<InMemoryAccountRepository>, Account) {
        let repo = Arc::new(InMemoryAccountRepository::new());
        let issuer = CredentialIssuer::new("unit_pepper".to_string());
        let account = repo
            .insert(NewAccount {
                username: "sara1234".to_string(),
                email: "sara@example.com".to_string(),
                password_hash: issuer.hash_password("Sara123456").unwrap(),
                qr_token: "a".repeat(64),
                profile: Profile::Student(StudentProfile {
                    name: "Sara".to_string(),
                    class_name: "8".to_string(),
                    division: "C".to_string(),
                    parent_name: "Omar".to_string(),
                    place: "Town".to_string(),
                }),
            })
            .await
            .unwrap();

        let manager = AuthManager::new(
            repo.clone(),
            issuer,
            Arc::new(TokenDenylist::new()),
            SECRET.to_string(),
        );
        (manager, repo, account)
    }

    fn password_login(identifier: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: Some(identifier.to_string()),
            email: None,
            password: password.to_string(),
            role: Role::Student,
        }
    }

    #[tokio::test]
    async fn test_login_by_username_and_email() {
        let (manager, _, account) = setup().await;

        let outcome = manager
            .login(password_login("sara1234", "Sara123456"))
            .await
            .unwrap();
        assert_eq!(outcome.user.id, account.id);

        // Email fallback is case-insensitive
        let outcome = manager
            .login(password_login("Sara@Example.com", "Sara123456"))
            .await
            .unwrap();
        assert_eq!(outcome.user.username, "sara1234");
    }

    #[tokio::test]
    async fn test_failures_collapse_to_invalid_credentials() {
        let (manager, repo, account) = setup().await;

        let wrong_password = manager.login(password_login("sara1234", "nope")).await;
        assert!(matches!(wrong_password, Err(AuthError::InvalidCredentials)));

        let unknown = manager.login(password_login("ghost", "Sara123456")).await;
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));

        let wrong_role = manager
            .login(LoginRequest {
                role: Role::Controller,
                ..password_login("sara1234", "Sara123456")
            })
            .await;
        assert!(matches!(wrong_role, Err(AuthError::InvalidCredentials)));

        repo.set_active(Role::Student, account.id, false).await.unwrap();
        let inactive = manager.login(password_login("sara1234", "Sara123456")).await;
        assert!(matches!(inactive, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_unknown_identifier_still_runs_password_verify() {
        let (manager, _, _) = setup().await;
        assert!(!manager.issuer.dummy_hash_ready());

        let unknown = manager.login(password_login("ghost", "Sara123456")).await;
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
        assert!(manager.issuer.dummy_hash_ready());
    }

    #[tokio::test]
    async fn test_login_requires_identifier_and_password() {
        let (manager, _, _) = setup().await;

        let err = manager
            .login(LoginRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation { ref field, .. } if field == "username"));

        let err = manager.login(password_login("sara1234", "")).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation { ref field, .. } if field == "password"));
    }

    #[tokio::test]
    async fn test_login_records_last_login() {
        let (manager, repo, account) = setup().await;
        manager
            .login(password_login("sara1234", "Sara123456"))
            .await
            .unwrap();

        let stored = repo
            .find_by_id(Role::Student, account.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.last_login.is_some());
    }

    #[tokio::test]
    async fn test_qr_login() {
        let (manager, _, account) = setup().await;

        let outcome = manager
            .login_qr(QrLoginRequest {
                qr_token: "a".repeat(64),
                role: Role::Student,
            })
            .await
            .unwrap();
        assert_eq!(outcome.user.id, account.id);

        let err = manager
            .login_qr(QrLoginRequest {
                qr_token: "b".repeat(64),
                role: Role::Student,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_token_round_trip_carries_role() {
        let (manager, _, _) = setup().await;
        let outcome = manager
            .login(password_login("sara1234", "Sara123456"))
            .await
            .unwrap();

        let claims = manager.verify_access_token(&outcome.token).await.unwrap();
        assert_eq!(claims.role, Role::Student);
        assert_eq!(claims.username, "sara1234");
        assert_eq!(claims.exp, outcome.expires_at.timestamp());
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let (manager, _, account) = setup().await;
        let manager = manager.with_token_ttl(Duration::seconds(-30));

        let (token, _) = manager.issue_token(&account).unwrap();
        let err = manager.verify_access_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn test_tampered_token_rejected() {
        let (manager, _, account) = setup().await;
        let (token, _) = manager.issue_token(&account).unwrap();

        let mut tampered = token.clone().into_bytes();
        let last = tampered.len() - 2;
        tampered[last] = if tampered[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(tampered).unwrap();

        let err = manager.verify_access_token(&tampered).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));

        let err = manager.verify_access_token("not.a.jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn test_token_signed_with_other_secret_rejected() {
        let (manager, repo, account) = setup().await;
        let other = AuthManager::new(
            repo,
            CredentialIssuer::new("unit_pepper".to_string()),
            Arc::new(TokenDenylist::new()),
            "a_completely_different_secret_value".to_string(),
        );

        let (token, _) = other.issue_token(&account).unwrap();
        assert!(matches!(
            manager.verify_access_token(&token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let (manager, _, account) = setup().await;
        let (token, _) = manager.issue_token(&account).unwrap();
        let claims = manager.verify_access_token(&token).await.unwrap();

        manager.logout(&claims).await;

        assert!(matches!(
            manager.verify_access_token(&token).await,
            Err(AuthError::InvalidToken)
        ));
        // A fresh token for the same account is unaffected
        let (fresh, _) = manager.issue_token(&account).unwrap();
        assert!(manager.verify_access_token(&fresh).await.is_ok());
    }

    #[test]
    fn test_require_role() {
        let claims = AccessTokenClaims {
            sub: 1,
            role: Role::Student,
            username: "s".to_string(),
            jti: "j".to_string(),
            exp: 0,
            iat: 0,
        };
        assert!(AuthManager::require_role(&claims, Role::Student).is_ok());
        assert!(matches!(
            AuthManager::require_role(&claims, Role::Controller),
            Err(AuthError::Forbidden)
        ));
    }
}
