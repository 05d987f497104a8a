/*
 * Responsibility
 * - Users の request/response DTO
 * - 形式チェックは validate()、業務ルール (blank / default role) は IdentityService
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::auth::RoleSet;
use crate::services::identity::{CreatedIdentity, Identity, IdentityChanges, NewIdentity};

const MAX_FIELD_LEN: usize = 256;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: Option<String>,
    /// Omitted: a password is generated and returned once.
    pub password: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.username.len() > MAX_FIELD_LEN {
            return Err("username must be <= 256 chars");
        }
        if let Some(email) = &self.email
            && email.len() > MAX_FIELD_LEN
        {
            return Err("email must be <= 256 chars");
        }
        if self.roles.iter().any(|r| r.contains(',')) {
            return Err("role names can not contain ','");
        }
        Ok(())
    }
}

impl From<CreateUserRequest> for NewIdentity {
    fn from(req: CreateUserRequest) -> Self {
        Self {
            username: req.username,
            email: req.email,
            password: req.password,
            roles: req.roles,
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub roles: Option<Vec<String>>,
}

impl UpdateUserRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if let Some(email) = &self.email
            && email.len() > MAX_FIELD_LEN
        {
            return Err("email must be <= 256 chars");
        }
        if let Some(roles) = &self.roles
            && roles.iter().any(|r| r.contains(','))
        {
            return Err("role names can not contain ','");
        }
        Ok(())
    }
}

impl From<UpdateUserRequest> for IdentityChanges {
    fn from(req: UpdateUserRequest) -> Self {
        Self {
            email: req.email,
            password: req.password,
            roles: req.roles,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub roles: RoleSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Identity> for UserResponse {
    fn from(identity: Identity) -> Self {
        Self {
            roles: identity.role_set(),
            id: identity.id,
            username: identity.username,
            email: identity.email,
            created_at: identity.created_at,
            updated_at: identity.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub user: UserResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_password: Option<String>,
}

impl From<CreatedIdentity> for CreateUserResponse {
    fn from(created: CreatedIdentity) -> Self {
        Self {
            user: created.identity.into(),
            generated_password: created.generated_password,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::identity::test_identity;

    #[test]
    fn response_never_carries_the_hash() {
        let mut identity = test_identity("tina", "class_teacher,admin");
        identity.password_hash = "$argon2id$secret".into();

        let json = serde_json::to_value(UserResponse::from(identity)).unwrap();

        assert!(json.get("password_hash").is_none());
        assert_eq!(json["roles"], serde_json::json!(["admin", "class_teacher"]));
    }

    #[test]
    fn delimiter_in_role_name_is_rejected() {
        let req = UpdateUserRequest {
            email: None,
            password: None,
            roles: Some(vec!["admin,class_teacher".into()]),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn create_without_roles_deserializes() {
        let req: CreateUserRequest = serde_json::from_str(r#"{"username":"tina"}"#).unwrap();
        assert!(req.roles.is_empty());
        assert!(req.password.is_none());
        assert!(req.validate().is_ok());
    }
}
