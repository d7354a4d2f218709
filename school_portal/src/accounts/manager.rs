//! Account lifecycle: registration, profile maintenance, resets and activation.

use super::validation::{normalize_email, required, validate_new_student, validate_profile_update};
use crate::auth::{
    AccessTokenClaims, Account, AccountId, AuthError, AuthManager, AuthResult, ControllerProfile,
    CredentialIssuer, NewAccount, NewController, NewStudent, PasswordChange, PasswordReset,
    Profile, ProfileUpdate, QrPayload, RegisteredStudent, Role, StudentProfile, UserView,
    credentials::{validate_password_strength, validate_username},
};
use crate::db::AccountRepository;
use crate::mail::{Mailer, OutgoingMail};
use std::sync::Arc;

/// Username candidates tried before registration gives up
pub const MAX_USERNAME_ATTEMPTS: usize = 8;

/// Account manager
#[derive(Clone)]
pub struct AccountManager {
    accounts: Arc<dyn AccountRepository>,
    issuer: CredentialIssuer,
    mailer: Arc<dyn Mailer>,
    qr_embeds_password: bool,
}

impl AccountManager {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        issuer: CredentialIssuer,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            accounts,
            issuer,
            mailer,
            qr_embeds_password: false,
        }
    }

    /// Embed the plaintext password in registration QR codes
    pub fn with_qr_password(mut self, embed: bool) -> Self {
        self.qr_embeds_password = embed;
        self
    }

    /// Register a student with generated credentials
    ///
    /// The returned `password` is the only plaintext copy; the store keeps
    /// its hash. The QR image is rendered before each insert so a rendering
    /// failure leaves nothing behind.
    ///
    /// # Errors
    ///
    /// * `AuthError::Validation` - Missing field or malformed email
    /// * `AuthError::Conflict` - Email taken, or no free username found
    pub async fn register_student(&self, input: NewStudent) -> AuthResult<RegisteredStudent> {
        let (profile, email) = validate_new_student(&input)?;

        if self
            .accounts
            .find_by_email(Role::Student, &email)
            .await?
            .is_some()
        {
            return Err(AuthError::Conflict("email".to_string()));
        }

        let password = self.issuer.generate_password(&profile.name);
        let password_hash = self.issuer.hash_password(&password)?;
        let qr_token = self.issuer.generate_qr_token();

        let (account, qr_code_image) = self
            .insert_with_free_username(&profile, email, password_hash, qr_token, &password)
            .await?;

        log::info!("Registered student {} as {}", account.id, account.username);

        let email_sent = self
            .deliver(OutgoingMail::welcome(
                &account.email,
                account.profile.name(),
                &account.username,
                &password,
            ))
            .await;

        Ok(RegisteredStudent {
            id: account.id,
            name: account.profile.name().to_string(),
            username: account.username,
            password,
            email: account.email,
            qr_token: account.qr_token,
            qr_code_image,
            email_sent,
        })
    }

    /// Create a controller account with a chosen username and password
    pub async fn create_controller(&self, input: NewController) -> AuthResult<UserView> {
        validate_username(&input.username)?;
        validate_password_strength(&input.password)?;
        let email = normalize_email(&input.email)?;
        let name = required("name", &input.name)?;

        if self
            .accounts
            .find_by_email(Role::Controller, &email)
            .await?
            .is_some()
        {
            return Err(AuthError::Conflict("email".to_string()));
        }
        if self
            .accounts
            .username_exists(Role::Controller, &input.username)
            .await?
        {
            return Err(AuthError::Conflict("username".to_string()));
        }

        let account = self
            .accounts
            .insert(NewAccount {
                username: input.username,
                email,
                password_hash: self.issuer.hash_password(&input.password)?,
                qr_token: self.issuer.generate_qr_token(),
                profile: Profile::Controller(ControllerProfile { name }),
            })
            .await?;

        log::info!("Created controller {} ({})", account.id, account.username);
        Ok(UserView::from(&account))
    }

    /// Create the controller unless one with that username exists.
    /// Returns whether an account was created.
    pub async fn ensure_controller(&self, input: NewController) -> AuthResult<bool> {
        if self
            .accounts
            .username_exists(Role::Controller, &input.username)
            .await?
        {
            return Ok(false);
        }
        self.create_controller(input).await?;
        Ok(true)
    }

    /// Fresh profile of the caller
    pub async fn profile(&self, claims: &AccessTokenClaims) -> AuthResult<UserView> {
        let account = self.active_account(claims).await?;
        Ok(UserView::from(&account))
    }

    /// Update mutable profile fields of the caller
    pub async fn update_profile(
        &self,
        claims: &AccessTokenClaims,
        update: ProfileUpdate,
    ) -> AuthResult<UserView> {
        let update = validate_profile_update(claims.role, &update)?;
        self.active_account(claims).await?;

        let account = self
            .accounts
            .update_profile(claims.role, claims.sub, &update)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        Ok(UserView::from(&account))
    }

    /// Change the caller's password after re-verifying the current one
    pub async fn change_password(
        &self,
        claims: &AccessTokenClaims,
        change: PasswordChange,
    ) -> AuthResult<()> {
        let account = self.active_account(claims).await?;
        self.issuer
            .verify_password(&change.current_password, &account.password_hash)?;
        validate_password_strength(&change.new_password)?;

        let hash = self.issuer.hash_password(&change.new_password)?;
        if !self
            .accounts
            .update_password_hash(claims.role, claims.sub, &hash)
            .await?
        {
            return Err(AuthError::Unauthorized);
        }

        log::info!("{} {} changed password", claims.role, claims.sub);
        Ok(())
    }

    /// Issue a new generated password for a student (controllers only)
    pub async fn reset_student_password(
        &self,
        actor: &AccessTokenClaims,
        student_id: AccountId,
    ) -> AuthResult<PasswordReset> {
        AuthManager::require_role(actor, Role::Controller)?;

        let account = self
            .accounts
            .find_by_id(Role::Student, student_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        let password = self.issuer.generate_password(account.profile.name());
        let hash = self.issuer.hash_password(&password)?;
        self.accounts
            .update_password_hash(Role::Student, student_id, &hash)
            .await?;

        log::info!(
            "Controller {} reset password of student {}",
            actor.sub,
            student_id
        );

        let email_sent = self
            .deliver(OutgoingMail::password_reset(
                &account.email,
                account.profile.name(),
                &account.username,
                &password,
            ))
            .await;

        Ok(PasswordReset {
            id: account.id,
            username: account.username,
            password,
            email_sent,
        })
    }

    /// Soft-deactivate or restore a student (controllers only)
    pub async fn set_student_active(
        &self,
        actor: &AccessTokenClaims,
        student_id: AccountId,
        active: bool,
    ) -> AuthResult<UserView> {
        AuthManager::require_role(actor, Role::Controller)?;

        if !self
            .accounts
            .set_active(Role::Student, student_id, active)
            .await?
        {
            return Err(AuthError::AccountNotFound);
        }

        let account = self
            .accounts
            .find_by_id(Role::Student, student_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        log::info!(
            "Controller {} set student {} active={}",
            actor.sub,
            student_id,
            active
        );
        Ok(UserView::from(&account))
    }

    /// List students (controllers only)
    pub async fn list_students(
        &self,
        actor: &AccessTokenClaims,
        include_inactive: bool,
    ) -> AuthResult<Vec<UserView>> {
        AuthManager::require_role(actor, Role::Controller)?;

        let accounts = self.accounts.list(Role::Student, include_inactive).await?;
        Ok(accounts.iter().map(UserView::from).collect())
    }

    /// The caller's account; missing or deactivated accounts lose their session
    async fn active_account(&self, claims: &AccessTokenClaims) -> AuthResult<Account> {
        match self.accounts.find_by_id(claims.role, claims.sub).await? {
            Some(account) if account.is_active => Ok(account),
            _ => Err(AuthError::Unauthorized),
        }
    }

    /// Insert under a derived username, regenerating it when the candidate is
    /// taken either before the insert or by a concurrent registration.
    async fn insert_with_free_username(
        &self,
        profile: &StudentProfile,
        email: String,
        password_hash: String,
        qr_token: String,
        password: &str,
    ) -> AuthResult<(Account, String)> {
        for _ in 0..MAX_USERNAME_ATTEMPTS {
            let username = self.issuer.derive_username(&profile.name);
            if self
                .accounts
                .username_exists(Role::Student, &username)
                .await?
            {
                log::debug!("Username candidate {username} taken, regenerating");
                continue;
            }

            let mut payload = QrPayload::login(Role::Student, &username, &qr_token);
            if self.qr_embeds_password {
                payload = payload.with_password(password);
            }
            let qr_code_image = payload.to_data_url()?;

            let inserted = self
                .accounts
                .insert(NewAccount {
                    username,
                    email: email.clone(),
                    password_hash: password_hash.clone(),
                    qr_token: qr_token.clone(),
                    profile: Profile::Student(profile.clone()),
                })
                .await;

            match inserted {
                Ok(account) => return Ok((account, qr_code_image)),
                Err(AuthError::Conflict(field)) if field == "username" => {
                    log::debug!("Username claimed concurrently, regenerating");
                }
                Err(e) => return Err(e),
            }
        }
        Err(AuthError::Conflict("username".to_string()))
    }

    async fn deliver(&self, mail: OutgoingMail) -> bool {
        let to = mail.to.clone();
        match self.mailer.send(mail).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to deliver mail to {to}: {e}");
                false
            }
        }
    }
}
