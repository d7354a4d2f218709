//! In-process account store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::repository::AccountRepository;
use crate::auth::{
    Account, AccountId, AuthError, AuthResult, NewAccount, Profile, ProfileUpdate, Role,
};

#[derive(Debug, Default)]
struct RoleStore {
    last_id: AccountId,
    accounts: BTreeMap<AccountId, Account>,
}

impl RoleStore {
    fn find(&self, predicate: impl Fn(&Account) -> bool) -> Option<Account> {
        self.accounts.values().find(|a| predicate(a)).cloned()
    }
}

#[derive(Debug, Default)]
struct Stores {
    students: RoleStore,
    controllers: RoleStore,
}

impl Stores {
    fn role(&self, role: Role) -> &RoleStore {
        match role {
            Role::Student => &self.students,
            Role::Controller => &self.controllers,
        }
    }

    fn role_mut(&mut self, role: Role) -> &mut RoleStore {
        match role {
            Role::Student => &mut self.students,
            Role::Controller => &mut self.controllers,
        }
    }
}

/// [`AccountRepository`] held entirely in memory.
///
/// Uniqueness is checked and the row inserted under one write lock, so
/// concurrent duplicate registrations see the same conflict the database
/// constraint would raise.
#[derive(Debug, Default)]
pub struct InMemoryAccountRepository {
    stores: RwLock<Stores>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn insert(&self, account: NewAccount) -> AuthResult<Account> {
        let mut stores = self.stores.write().await;
        let store = stores.role_mut(account.role());

        for existing in store.accounts.values() {
            if existing.username == account.username {
                return Err(AuthError::Conflict("username".to_string()));
            }
            if existing.email == account.email {
                return Err(AuthError::Conflict("email".to_string()));
            }
            if existing.qr_token == account.qr_token {
                return Err(AuthError::Conflict("qrToken".to_string()));
            }
        }

        store.last_id += 1;
        let now = Utc::now();
        let stored = Account {
            id: store.last_id,
            username: account.username,
            email: account.email,
            password_hash: account.password_hash,
            qr_token: account.qr_token,
            profile: account.profile,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login: None,
        };
        store.accounts.insert(stored.id, stored.clone());

        Ok(stored)
    }

    async fn find_by_id(&self, role: Role, id: AccountId) -> AuthResult<Option<Account>> {
        Ok(self.stores.read().await.role(role).accounts.get(&id).cloned())
    }

    async fn find_by_username(&self, role: Role, username: &str) -> AuthResult<Option<Account>> {
        Ok(self
            .stores
            .read()
            .await
            .role(role)
            .find(|a| a.username == username))
    }

    async fn find_by_email(&self, role: Role, email: &str) -> AuthResult<Option<Account>> {
        Ok(self.stores.read().await.role(role).find(|a| a.email == email))
    }

    async fn find_by_qr_token(&self, role: Role, qr_token: &str) -> AuthResult<Option<Account>> {
        Ok(self
            .stores
            .read()
            .await
            .role(role)
            .find(|a| a.qr_token == qr_token))
    }

    async fn username_exists(&self, role: Role, username: &str) -> AuthResult<bool> {
        Ok(self
            .stores
            .read()
            .await
            .role(role)
            .accounts
            .values()
            .any(|a| a.username == username))
    }

    async fn update_profile(
        &self,
        role: Role,
        id: AccountId,
        update: &ProfileUpdate,
    ) -> AuthResult<Option<Account>> {
        let mut stores = self.stores.write().await;
        let Some(account) = stores.role_mut(role).accounts.get_mut(&id) else {
            return Ok(None);
        };

        match &mut account.profile {
            Profile::Student(p) => {
                if let Some(name) = &update.name {
                    p.name = name.clone();
                }
                if let Some(class_name) = &update.class_name {
                    p.class_name = class_name.clone();
                }
                if let Some(division) = &update.division {
                    p.division = division.clone();
                }
                if let Some(parent_name) = &update.parent_name {
                    p.parent_name = parent_name.clone();
                }
                if let Some(place) = &update.place {
                    p.place = place.clone();
                }
            }
            Profile::Controller(p) => {
                if let Some(name) = &update.name {
                    p.name = name.clone();
                }
            }
        }
        account.updated_at = Utc::now();

        Ok(Some(account.clone()))
    }

    async fn update_password_hash(
        &self,
        role: Role,
        id: AccountId,
        password_hash: &str,
    ) -> AuthResult<bool> {
        let mut stores = self.stores.write().await;
        match stores.role_mut(role).accounts.get_mut(&id) {
            Some(account) => {
                account.password_hash = password_hash.to_string();
                account.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_active(&self, role: Role, id: AccountId, active: bool) -> AuthResult<bool> {
        let mut stores = self.stores.write().await;
        match stores.role_mut(role).accounts.get_mut(&id) {
            Some(account) => {
                account.is_active = active;
                account.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_login(&self, role: Role, id: AccountId) -> AuthResult<()> {
        if let Some(account) = self.stores.write().await.role_mut(role).accounts.get_mut(&id) {
            account.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn list(&self, role: Role, include_inactive: bool) -> AuthResult<Vec<Account>> {
        Ok(self
            .stores
            .read()
            .await
            .role(role)
            .accounts
            .values()
            .filter(|a| include_inactive || a.is_active)
            .cloned()
            .collect())
    }
}
