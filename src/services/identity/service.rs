/*
 * Responsibility
 * - Identity の lifecycle (create / update / destroy / authenticate / session)
 * - password は必ずここで hash してから store に渡す
 * - 削除は destroy_identity 経由のみ (admin 保護)
 */
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::auth::password::{PasswordHasher, generate_password};
use crate::services::auth::roles::RoleSet;
use crate::services::identity::{
    IRREVOCABLE_ROLES, Identity, IdentityError, IdentityStore, NewIdentityRecord,
    ValidationErrors, destroy_identity,
};

/// Role assigned when a new identity comes without any.
pub const DEFAULT_ROLE: &str = "class_teacher";

#[derive(Debug, Clone, Default)]
pub struct NewIdentity {
    pub username: String,
    pub email: Option<String>,
    /// `None` generates a random password which is returned once.
    pub password: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IdentityChanges {
    pub email: Option<String>,
    pub password: Option<String>,
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct CreatedIdentity {
    pub identity: Identity,
    pub generated_password: Option<String>,
}

#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn IdentityStore>,
    hasher: Arc<PasswordHasher>,
    generated_password_len: usize,
    // Verified against when the username is unknown, so both paths cost one derivation.
    dummy_record: Arc<str>,
}

impl std::fmt::Debug for IdentityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityService")
            .field("store", &self.store.backend_name())
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}

impl IdentityService {
    pub async fn new(
        store: Arc<dyn IdentityStore>,
        hasher: Arc<PasswordHasher>,
        generated_password_len: usize,
    ) -> Result<Self, IdentityError> {
        let filler = generate_password(16)?;
        let dummy_record = hasher.hash_async(filler).await?;

        Ok(Self {
            store,
            hasher,
            generated_password_len,
            dummy_record: dummy_record.into(),
        })
    }

    pub fn store(&self) -> Arc<dyn IdentityStore> {
        Arc::clone(&self.store)
    }

    pub async fn list(&self) -> Result<Vec<Identity>, IdentityError> {
        Ok(self.store.list().await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Identity, IdentityError> {
        self.store.find(id).await?.ok_or(IdentityError::NotFound)
    }

    pub async fn create(&self, input: NewIdentity) -> Result<CreatedIdentity, IdentityError> {
        let mut errors = ValidationErrors::default();
        let username = input.username.trim().to_string();
        if username.is_empty() {
            errors.add("username", "Username can not be blank.");
        }
        if let Some(email) = &input.email
            && email.trim().is_empty()
        {
            errors.add("email", "Email can not be blank.");
        }
        if let Some(password) = &input.password
            && password.is_empty()
        {
            errors.add("password", "Password can not be blank.");
        }
        errors.into_result()?;

        let email = input.email.unwrap_or_else(|| username.clone());
        let roles = normalize_roles(&input.roles);

        let (password, generated_password) = match input.password {
            Some(password) => (password, None),
            None => {
                let generated = generate_password(self.generated_password_len)?;
                (generated.clone(), Some(generated))
            }
        };

        debug!(username = %username, "hashing password");
        let password_hash = self.hasher.hash_async(password).await?;

        let identity = self
            .store
            .create(NewIdentityRecord {
                username,
                email,
                password_hash,
                roles,
            })
            .await?;

        info!(username = %identity.username, roles = %identity.roles, "created identity");

        Ok(CreatedIdentity {
            identity,
            generated_password,
        })
    }

    pub async fn update(
        &self,
        id: Uuid,
        changes: IdentityChanges,
    ) -> Result<Identity, IdentityError> {
        let mut errors = ValidationErrors::default();
        if let Some(email) = &changes.email
            && email.trim().is_empty()
        {
            errors.add("email", "Email can not be blank.");
        }
        if let Some(password) = &changes.password
            && password.is_empty()
        {
            errors.add("password", "Password can not be blank.");
        }
        errors.into_result()?;

        let mut identity = self.get(id).await?;

        if let Some(email) = changes.email {
            identity.email = email;
        }
        if let Some(roles) = changes.roles {
            let roles = normalize_roles(&roles);
            if revokes_irrevocable(&identity, &roles) {
                warn!(
                    username = %identity.username,
                    "refusing to revoke an irrevocable role"
                );
                return Err(IdentityError::Protected {
                    username: identity.username,
                });
            }
            identity.roles = roles;
        }
        if let Some(password) = changes.password {
            identity.password_hash = self.hasher.hash_async(password).await?;
        }

        self.store
            .update(&identity)
            .await?
            .ok_or(IdentityError::NotFound)
    }

    pub async fn destroy(&self, id: Uuid) -> Result<(), IdentityError> {
        let identity = self.get(id).await?;
        destroy_identity(self.store.as_ref(), &identity).await
    }

    /// Check a username/password pair. Every failure is `InvalidCredentials`.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Identity, IdentityError> {
        // Usernames are stored trimmed.
        let username = username.trim();
        let Some(identity) = self.store.find_by_username(username).await? else {
            let _ = self
                .hasher
                .verify_async(password.to_string(), self.dummy_record.to_string())
                .await;
            debug!("login attempt for unknown username");
            return Err(IdentityError::InvalidCredentials);
        };

        match self
            .hasher
            .verify_async(password.to_string(), identity.password_hash.clone())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(username = %identity.username, "password mismatch");
                return Err(IdentityError::InvalidCredentials);
            }
            Err(err) => {
                warn!(username = %identity.username, error = %err, "stored password record rejected");
                return Err(IdentityError::InvalidCredentials);
            }
        }

        if !self.hasher.needs_rehash(&identity.password_hash) {
            return Ok(identity);
        }

        // Cost parameters were rotated since this record was written.
        let rehashed = match self.hasher.hash_async(password.to_string()).await {
            Ok(hash) => hash,
            Err(err) => {
                warn!(username = %identity.username, error = %err, "rehash failed");
                return Ok(identity);
            }
        };
        match self.store.set_password_hash(identity.id, &rehashed).await {
            Ok(Some(updated)) => {
                info!(username = %updated.username, "password rehashed with current parameters");
                Ok(updated)
            }
            Ok(None) => Err(IdentityError::InvalidCredentials),
            Err(err) => {
                warn!(username = %identity.username, error = %err, "storing rehashed password failed");
                Ok(identity)
            }
        }
    }

    /// Bind a fresh session identifier to `identity`.
    pub async fn start_session(&self, identity: Identity) -> Result<Identity, IdentityError> {
        self.store
            .set_session(identity.id, Some(Uuid::new_v4()))
            .await?
            .ok_or(IdentityError::NotFound)
    }

    pub async fn end_session(&self, id: Uuid) -> Result<(), IdentityError> {
        self.store
            .set_session(id, None)
            .await?
            .ok_or(IdentityError::NotFound)?;
        Ok(())
    }

    /// Seed an administrator if `username` does not exist yet.
    pub async fn ensure_admin(&self, username: &str, password: &str) -> Result<bool, IdentityError> {
        if self.store.find_by_username(username).await?.is_some() {
            return Ok(false);
        }

        self.create(NewIdentity {
            username: username.to_string(),
            email: None,
            password: Some(password.to_string()),
            roles: vec!["admin".to_string()],
        })
        .await?;
        Ok(true)
    }
}

/// True when `identity` holds an irrevocable role that `new_roles` drops.
fn revokes_irrevocable(identity: &Identity, new_roles: &str) -> bool {
    let current = identity.role_set();
    let next = RoleSet::from_delimited(new_roles);
    IRREVOCABLE_ROLES
        .iter()
        .any(|role| current.contains(role) && !next.contains(role))
}

fn normalize_roles(roles: &[String]) -> String {
    let named: Vec<&str> = roles
        .iter()
        .map(String::as_str)
        .filter(|r| !r.is_empty())
        .collect();

    if named.is_empty() {
        DEFAULT_ROLE.to_string()
    } else {
        RoleSet::from_names(named).to_delimited()
    }
}
