//! Revoked session token ids.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Token ids revoked by logout, kept until the token would have expired anyway.
#[derive(Debug, Default)]
pub struct TokenDenylist {
    revoked: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl TokenDenylist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke `jti` until `expires_at`
    pub async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) {
        let mut revoked = self.revoked.write().await;
        let now = Utc::now();
        revoked.retain(|_, exp| *exp > now);
        if expires_at > now {
            revoked.insert(jti.to_string(), expires_at);
        }
    }

    pub async fn is_revoked(&self, jti: &str) -> bool {
        self.revoked
            .read()
            .await
            .get(jti)
            .is_some_and(|exp| *exp > Utc::now())
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        self.revoked
            .read()
            .await
            .values()
            .filter(|exp| **exp > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
