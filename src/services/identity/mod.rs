/*
 * Responsibility
 * - Identity (認証主体) の型と IdentityStore (外部 collaborator) の契約
 * - 削除時の privileged-identity 保護 (admin は削除不可)
 * - lifecycle (作成/更新/削除/ログイン) は service に置く
 */
mod memory;
mod service;

pub use memory::MemoryIdentityStore;
pub use service::{
    CreatedIdentity, DEFAULT_ROLE, IdentityChanges, IdentityService, NewIdentity,
};

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::repos::error::{RepoError, RepoResult};
use crate::services::auth::password::PasswordError;
use crate::services::auth::roles::RoleSet;

/// Roles that make an identity undeletable.
pub const IRREVOCABLE_ROLES: &[&str] = &["admin"];

#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    /// Comma separated role names, as stored.
    pub roles: String,
    /// Correlates the current login with server-side session state.
    pub session_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    pub fn role_set(&self) -> RoleSet {
        RoleSet::from_delimited(&self.roles)
    }

    pub fn is_protected(&self) -> bool {
        let roles = self.role_set();
        IRREVOCABLE_ROLES.iter().any(|r| roles.contains(r))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print the password hash
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

/// Row to insert; the store assigns id and timestamps.
#[derive(Clone)]
pub struct NewIdentityRecord {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub roles: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), IdentityError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(IdentityError::Validation(self))
        }
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("validation failed")]
    Validation(ValidationErrors),

    #[error("identity not found")]
    NotFound,

    #[error("can not delete protected identity '{username}'")]
    Protected { username: String },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Store(#[from] RepoError),
}

/// Identity persistence.
///
/// Implementations are shared across concurrent requests; reads must be
/// atomic and consistent. Write safety is the implementation's business.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    // Returns the backend name (for logging).
    fn backend_name(&self) -> &'static str;

    async fn find(&self, id: Uuid) -> RepoResult<Option<Identity>>;

    async fn find_by_session(&self, session_id: Uuid) -> RepoResult<Option<Identity>>;

    async fn find_by_username(&self, username: &str) -> RepoResult<Option<Identity>>;

    async fn list(&self) -> RepoResult<Vec<Identity>>;

    // Fails with `RepoError::Conflict` when the username is taken.
    async fn create(&self, new: NewIdentityRecord) -> RepoResult<Identity>;

    // Persists email, password hash and roles. The session id is left alone.
    // Returns `Ok(None)` when the identity no longer exists.
    async fn update(&self, identity: &Identity) -> RepoResult<Option<Identity>>;

    // Writes only the session id column.
    async fn set_session(&self, id: Uuid, session_id: Option<Uuid>)
    -> RepoResult<Option<Identity>>;

    // Writes only the password hash column.
    async fn set_password_hash(&self, id: Uuid, password_hash: &str)
    -> RepoResult<Option<Identity>>;

    async fn destroy(&self, id: Uuid) -> RepoResult<bool>;
}

/// The only deletion path. Rejects protected identities before touching the
/// store.
pub async fn destroy_identity(
    store: &dyn IdentityStore,
    identity: &Identity,
) -> Result<(), IdentityError> {
    if identity.is_protected() {
        tracing::error!(
            username = %identity.username,
            "refusing to delete identity holding an irrevocable role"
        );
        return Err(IdentityError::Protected {
            username: identity.username.clone(),
        });
    }

    tracing::info!(username = %identity.username, "deleting identity");

    if store.destroy(identity.id).await? {
        Ok(())
    } else {
        Err(IdentityError::NotFound)
    }
}

#[cfg(test)]
pub(crate) fn test_identity(username: &str, roles: &str) -> Identity {
    let now = Utc::now();
    Identity {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: username.to_string(),
        password_hash: String::new(),
        roles: roles.to_string(),
        session_id: None,
        created_at: now,
        updated_at: now,
    }
}
