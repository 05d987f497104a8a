//! Role × path × method authorization.
//!
//! Policy evaluation is deny-by-default and fail-closed: a missing rule is a
//! deny, and a store that cannot answer is a deny too.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error};

use crate::services::auth::roles::RoleSet;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to load policy: {0}")]
    Load(String),

    #[error("policy evaluation failed: {0}")]
    Evaluation(String),
}

/// Policy engine behind the enforcer.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    // `path` is already normalized.
    async fn enforce(&self, role: &str, path: &str, method: &str) -> Result<bool, PolicyError>;
}

/// Strip trailing slashes so `/classes/` and `/classes` hit the same rule.
/// The root path stays `/`.
pub fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyRule {
    pub role: String,
    pub path: String,
    pub method: String,
}

impl PolicyRule {
    pub fn allow(role: &str, path: &str, method: &str) -> Self {
        Self {
            role: role.to_string(),
            path: normalize_path(path).to_string(),
            method: method.to_ascii_uppercase(),
        }
    }
}

/// Exact-match rule table.
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    rules: HashSet<PolicyRule>,
}

impl MemoryPolicyStore {
    pub fn new<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = PolicyRule>,
    {
        Self {
            rules: rules.into_iter().collect(),
        }
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn enforce(&self, role: &str, path: &str, method: &str) -> Result<bool, PolicyError> {
        Ok(self.rules.contains(&PolicyRule {
            role: role.to_string(),
            path: path.to_string(),
            method: method.to_ascii_uppercase(),
        }))
    }
}

#[derive(Clone)]
pub struct PolicyEnforcer {
    store: Arc<dyn PolicyStore>,
}

impl std::fmt::Debug for PolicyEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEnforcer")
            .field("store", &self.store.backend_name())
            .finish()
    }
}

impl PolicyEnforcer {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// Single-role evaluation.
    pub async fn is_allowed(
        &self,
        role: &str,
        path: &str,
        method: &str,
    ) -> Result<bool, PolicyError> {
        self.store.enforce(role, normalize_path(path), method).await
    }

    /// Short-circuiting OR over `roles` in their iteration order. The first
    /// store error aborts evaluation.
    pub async fn is_allowed_any(
        &self,
        roles: &RoleSet,
        path: &str,
        method: &str,
    ) -> Result<bool, PolicyError> {
        let path = normalize_path(path);
        for role in roles.iter() {
            if self.store.enforce(role, path, method).await? {
                debug!(role, path, method, "policy granted access");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `is_allowed_any` with errors folded into a deny.
    pub async fn permits(&self, roles: &RoleSet, path: &str, method: &str) -> bool {
        match self.is_allowed_any(roles, path, method).await {
            Ok(allowed) => allowed,
            Err(err) => {
                error!(error = %err, backend = self.store.backend_name(), "policy evaluation failed, denying");
                false
            }
        }
    }
}
