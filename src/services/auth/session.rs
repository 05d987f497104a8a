//! Session token → Identity resolution.
//!
//! The token is a UUID kept in server-side session state. No token means an
//! anonymous request; a token that is malformed or points at no identity is
//! an error, and the caller must clear it from the session before going on.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::repos::error::RepoError;
use crate::services::identity::{Identity, IdentityStore};

/// Key under which the session token is kept in server-side session state.
pub const SESSION_TOKEN_KEY: &str = "session_id";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("malformed session token")]
    MalformedToken,

    #[error("session not found")]
    NotFound,

    #[error("identity store unavailable: {0}")]
    Store(#[from] RepoError),
}

impl SessionError {
    /// Errors after which the stale token must be dropped and the request
    /// continues as anonymous.
    pub fn clears_session(&self) -> bool {
        matches!(self, Self::MalformedToken | Self::NotFound)
    }
}

#[derive(Clone)]
pub struct SessionResolver {
    store: Arc<dyn IdentityStore>,
}

impl std::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResolver")
            .field("store", &self.store.backend_name())
            .finish()
    }
}

impl SessionResolver {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    pub fn parse_token(raw: &str) -> Result<Uuid, SessionError> {
        Uuid::parse_str(raw).map_err(|_| SessionError::MalformedToken)
    }

    /// Read-only: never mutates the identity store.
    pub async fn resolve(&self, token: Option<&str>) -> Result<Option<Identity>, SessionError> {
        let Some(raw) = token else {
            return Ok(None);
        };

        let session_id = Self::parse_token(raw)?;

        match self.store.find_by_session(session_id).await? {
            Some(identity) => {
                debug!(username = %identity.username, "session resolved");
                Ok(Some(identity))
            }
            None => Err(SessionError::NotFound),
        }
    }
}
