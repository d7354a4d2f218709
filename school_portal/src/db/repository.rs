//! Account repository trait and its PostgreSQL implementation.

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use std::time::Duration;

use super::timeouts::{DEFAULT_QUERY_TIMEOUT, TimeoutError, with_timeout};
use crate::auth::{
    Account, AccountId, AuthError, AuthResult, ControllerProfile, NewAccount, Profile,
    ProfileUpdate, Role, StudentProfile,
};

/// Role-scoped account storage.
///
/// Implementations must enforce uniqueness of username, email and QR token
/// within a role and report violations as [`AuthError::Conflict`].
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a new account, returning it with id and timestamps assigned
    async fn insert(&self, account: NewAccount) -> AuthResult<Account>;

    async fn find_by_id(&self, role: Role, id: AccountId) -> AuthResult<Option<Account>>;

    async fn find_by_username(&self, role: Role, username: &str) -> AuthResult<Option<Account>>;

    async fn find_by_email(&self, role: Role, email: &str) -> AuthResult<Option<Account>>;

    async fn find_by_qr_token(&self, role: Role, qr_token: &str) -> AuthResult<Option<Account>>;

    async fn username_exists(&self, role: Role, username: &str) -> AuthResult<bool>;

    /// Apply the non-empty fields of `update`; `None` if the account is absent
    async fn update_profile(
        &self,
        role: Role,
        id: AccountId,
        update: &ProfileUpdate,
    ) -> AuthResult<Option<Account>>;

    /// Returns false if the account is absent
    async fn update_password_hash(
        &self,
        role: Role,
        id: AccountId,
        password_hash: &str,
    ) -> AuthResult<bool>;

    /// Soft-delete or restore. Returns false if the account is absent
    async fn set_active(&self, role: Role, id: AccountId, active: bool) -> AuthResult<bool>;

    async fn record_login(&self, role: Role, id: AccountId) -> AuthResult<()>;

    /// Accounts ordered by id
    async fn list(&self, role: Role, include_inactive: bool) -> AuthResult<Vec<Account>>;
}

const STUDENT_COLUMNS: &str = "id, username, email, password_hash, qr_token, name, class_name, \
     division, parent_name, place, is_active, created_at, updated_at, last_login";

const CONTROLLER_COLUMNS: &str = "id, username, email, password_hash, qr_token, name, \
     is_active, created_at, updated_at, last_login";

fn table(role: Role) -> &'static str {
    match role {
        Role::Student => "students",
        Role::Controller => "controllers",
    }
}

fn columns(role: Role) -> &'static str {
    match role {
        Role::Student => STUDENT_COLUMNS,
        Role::Controller => CONTROLLER_COLUMNS,
    }
}

fn row_to_account(role: Role, row: &PgRow) -> Account {
    let profile = match role {
        Role::Student => Profile::Student(StudentProfile {
            name: row.get("name"),
            class_name: row.get("class_name"),
            division: row.get("division"),
            parent_name: row.get("parent_name"),
            place: row.get("place"),
        }),
        Role::Controller => Profile::Controller(ControllerProfile {
            name: row.get("name"),
        }),
    };

    Account {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        qr_token: row.get("qr_token"),
        profile,
        is_active: row.get("is_active"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<chrono::NaiveDateTime, _>("updated_at").and_utc(),
        last_login: row
            .get::<Option<chrono::NaiveDateTime>, _>("last_login")
            .map(|dt| dt.and_utc()),
    }
}

/// Map a unique-constraint violation to the field that collided
fn conflict_or_database(err: TimeoutError) -> AuthError {
    if let TimeoutError::Database(sqlx::Error::Database(db_err)) = &err
        && db_err.is_unique_violation()
    {
        let constraint = db_err.constraint().unwrap_or_default();
        let field = if constraint.contains("email") {
            "email"
        } else if constraint.contains("qr_token") {
            "qrToken"
        } else {
            "username"
        };
        return AuthError::Conflict(field.to_string());
    }
    err.into()
}

/// PostgreSQL implementation of [`AccountRepository`]
pub struct PgAccountRepository {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    async fn find_one_by(
        &self,
        role: Role,
        column: &'static str,
        value: &str,
    ) -> AuthResult<Option<Account>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            columns(role),
            table(role),
            column
        );
        let row = with_timeout(
            self.query_timeout,
            sqlx::query(&sql).bind(value).fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.map(|r| row_to_account(role, &r)))
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn insert(&self, account: NewAccount) -> AuthResult<Account> {
        let role = account.role();
        let row = match &account.profile {
            Profile::Student(p) => {
                let sql = format!(
                    r#"
                    INSERT INTO students
                        (username, email, password_hash, qr_token, name, class_name, division, parent_name, place)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    RETURNING {STUDENT_COLUMNS}
                    "#
                );
                with_timeout(
                    self.query_timeout,
                    sqlx::query(&sql)
                        .bind(&account.username)
                        .bind(&account.email)
                        .bind(&account.password_hash)
                        .bind(&account.qr_token)
                        .bind(&p.name)
                        .bind(&p.class_name)
                        .bind(&p.division)
                        .bind(&p.parent_name)
                        .bind(&p.place)
                        .fetch_one(&self.pool),
                )
                .await
            }
            Profile::Controller(p) => {
                let sql = format!(
                    r#"
                    INSERT INTO controllers (username, email, password_hash, qr_token, name)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING {CONTROLLER_COLUMNS}
                    "#
                );
                with_timeout(
                    self.query_timeout,
                    sqlx::query(&sql)
                        .bind(&account.username)
                        .bind(&account.email)
                        .bind(&account.password_hash)
                        .bind(&account.qr_token)
                        .bind(&p.name)
                        .fetch_one(&self.pool),
                )
                .await
            }
        }
        .map_err(conflict_or_database)?;

        Ok(row_to_account(role, &row))
    }

    async fn find_by_id(&self, role: Role, id: AccountId) -> AuthResult<Option<Account>> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", columns(role), table(role));
        let row = with_timeout(
            self.query_timeout,
            sqlx::query(&sql).bind(id).fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.map(|r| row_to_account(role, &r)))
    }

    async fn find_by_username(&self, role: Role, username: &str) -> AuthResult<Option<Account>> {
        self.find_one_by(role, "username", username).await
    }

    async fn find_by_email(&self, role: Role, email: &str) -> AuthResult<Option<Account>> {
        self.find_one_by(role, "email", email).await
    }

    async fn find_by_qr_token(&self, role: Role, qr_token: &str) -> AuthResult<Option<Account>> {
        self.find_one_by(role, "qr_token", qr_token).await
    }

    async fn username_exists(&self, role: Role, username: &str) -> AuthResult<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE username = $1", table(role));
        let row = with_timeout(
            self.query_timeout,
            sqlx::query(&sql).bind(username).fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.is_some())
    }

    async fn update_profile(
        &self,
        role: Role,
        id: AccountId,
        update: &ProfileUpdate,
    ) -> AuthResult<Option<Account>> {
        let row = match role {
            Role::Student => {
                let sql = format!(
                    r#"
                    UPDATE students SET
                        name = COALESCE($2, name),
                        class_name = COALESCE($3, class_name),
                        division = COALESCE($4, division),
                        parent_name = COALESCE($5, parent_name),
                        place = COALESCE($6, place),
                        updated_at = NOW()
                    WHERE id = $1
                    RETURNING {STUDENT_COLUMNS}
                    "#
                );
                with_timeout(
                    self.query_timeout,
                    sqlx::query(&sql)
                        .bind(id)
                        .bind(&update.name)
                        .bind(&update.class_name)
                        .bind(&update.division)
                        .bind(&update.parent_name)
                        .bind(&update.place)
                        .fetch_optional(&self.pool),
                )
                .await?
            }
            Role::Controller => {
                let sql = format!(
                    r#"
                    UPDATE controllers SET name = COALESCE($2, name), updated_at = NOW()
                    WHERE id = $1
                    RETURNING {CONTROLLER_COLUMNS}
                    "#
                );
                with_timeout(
                    self.query_timeout,
                    sqlx::query(&sql)
                        .bind(id)
                        .bind(&update.name)
                        .fetch_optional(&self.pool),
                )
                .await?
            }
        };

        Ok(row.map(|r| row_to_account(role, &r)))
    }

    async fn update_password_hash(
        &self,
        role: Role,
        id: AccountId,
        password_hash: &str,
    ) -> AuthResult<bool> {
        let sql = format!(
            "UPDATE {} SET password_hash = $2, updated_at = NOW() WHERE id = $1",
            table(role)
        );
        let result = with_timeout(
            self.query_timeout,
            sqlx::query(&sql)
                .bind(id)
                .bind(password_hash)
                .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_active(&self, role: Role, id: AccountId, active: bool) -> AuthResult<bool> {
        let sql = format!(
            "UPDATE {} SET is_active = $2, updated_at = NOW() WHERE id = $1",
            table(role)
        );
        let result = with_timeout(
            self.query_timeout,
            sqlx::query(&sql).bind(id).bind(active).execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_login(&self, role: Role, id: AccountId) -> AuthResult<()> {
        let sql = format!("UPDATE {} SET last_login = NOW() WHERE id = $1", table(role));
        with_timeout(
            self.query_timeout,
            sqlx::query(&sql).bind(id).execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn list(&self, role: Role, include_inactive: bool) -> AuthResult<Vec<Account>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE is_active OR $1 ORDER BY id",
            columns(role),
            table(role)
        );
        let rows = with_timeout(
            self.query_timeout,
            sqlx::query(&sql).bind(include_inactive).fetch_all(&self.pool),
        )
        .await?;

        Ok(rows.iter().map(|r| row_to_account(role, r)).collect())
    }
}
