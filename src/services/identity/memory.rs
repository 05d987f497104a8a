use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repos::error::{RepoError, RepoResult};
use crate::services::identity::{Identity, IdentityStore, NewIdentityRecord};

/// Process-local identity store (tests, local development).
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    rows: RwLock<HashMap<Uuid, Identity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find(&self, id: Uuid) -> RepoResult<Option<Identity>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_by_session(&self, session_id: Uuid) -> RepoResult<Option<Identity>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|i| i.session_id == Some(session_id))
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> RepoResult<Option<Identity>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|i| i.username == username)
            .cloned())
    }

    async fn list(&self) -> RepoResult<Vec<Identity>> {
        let mut rows: Vec<Identity> = self.rows.read().await.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn create(&self, new: NewIdentityRecord) -> RepoResult<Identity> {
        let mut rows = self.rows.write().await;
        if rows.values().any(|i| i.username == new.username) {
            return Err(RepoError::Conflict);
        }

        let now = Utc::now();
        let identity = Identity {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            roles: new.roles,
            session_id: None,
            created_at: now,
            updated_at: now,
        };
        rows.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn update(&self, identity: &Identity) -> RepoResult<Option<Identity>> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(&identity.id) else {
            return Ok(None);
        };

        row.email = identity.email.clone();
        row.password_hash = identity.password_hash.clone();
        row.roles = identity.roles.clone();
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn set_session(
        &self,
        id: Uuid,
        session_id: Option<Uuid>,
    ) -> RepoResult<Option<Identity>> {
        let mut rows = self.rows.write().await;
        Ok(rows.get_mut(&id).map(|row| {
            row.session_id = session_id;
            row.updated_at = Utc::now();
            row.clone()
        }))
    }

    async fn set_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> RepoResult<Option<Identity>> {
        let mut rows = self.rows.write().await;
        Ok(rows.get_mut(&id).map(|row| {
            row.password_hash = password_hash.to_string();
            row.updated_at = Utc::now();
            row.clone()
        }))
    }

    async fn destroy(&self, id: Uuid) -> RepoResult<bool> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }
}
