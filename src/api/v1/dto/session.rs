/*
 * Responsibility
 * - login / session の request/response DTO
 */
use serde::{Deserialize, Serialize};

use crate::api::v1::dto::users::UserResponse;
use crate::services::auth::{RequestAuthContext, RoleSet};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.username.trim().is_empty() {
            return Err("username is required");
        }
        if self.password.is_empty() {
            return Err("password is required");
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    pub user: Option<UserResponse>,
    pub roles: RoleSet,
}

impl From<RequestAuthContext> for SessionResponse {
    fn from(ctx: RequestAuthContext) -> Self {
        Self {
            authenticated: ctx.is_authenticated(),
            user: ctx.identity.map(UserResponse::from),
            roles: ctx.roles,
        }
    }
}
