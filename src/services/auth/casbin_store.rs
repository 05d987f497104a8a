//! Casbin-backed policy store.
//!
//! Loads a model definition and a policy table from disk once at startup.
//! Rule paths in the table are written without trailing slashes, matching
//! what the enforcer passes in after normalization.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use casbin::{CoreApi, DefaultModel, Enforcer, FileAdapter};
use tokio::sync::RwLock;
use tracing::info;

use crate::services::auth::policy::{PolicyError, PolicyStore};

pub struct CasbinPolicyStore {
    enforcer: RwLock<Enforcer>,
    model_path: PathBuf,
    policy_path: PathBuf,
}

impl std::fmt::Debug for CasbinPolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasbinPolicyStore")
            .field("model_path", &self.model_path)
            .field("policy_path", &self.policy_path)
            .finish_non_exhaustive()
    }
}

impl CasbinPolicyStore {
    pub async fn load(model_path: &Path, policy_path: &Path) -> Result<Self, PolicyError> {
        let enforcer = build_enforcer(model_path, policy_path).await?;

        info!(
            model = %model_path.display(),
            policy = %policy_path.display(),
            "loaded rbac policy"
        );

        Ok(Self {
            enforcer: RwLock::new(enforcer),
            model_path: model_path.to_path_buf(),
            policy_path: policy_path.to_path_buf(),
        })
    }

    /// Re-read the policy table. On failure the previous rules stay active.
    pub async fn reload(&self) -> Result<(), PolicyError> {
        let fresh = build_enforcer(&self.model_path, &self.policy_path).await?;
        *self.enforcer.write().await = fresh;
        info!(policy = %self.policy_path.display(), "reloaded rbac policy");
        Ok(())
    }
}

async fn build_enforcer(model_path: &Path, policy_path: &Path) -> Result<Enforcer, PolicyError> {
    let model = DefaultModel::from_file(model_path)
        .await
        .map_err(|e| PolicyError::Load(format!("{}: {e}", model_path.display())))?;
    let adapter = FileAdapter::new(policy_path.to_path_buf());

    Enforcer::new(model, adapter)
        .await
        .map_err(|e| PolicyError::Load(format!("{}: {e}", policy_path.display())))
}

#[async_trait]
impl PolicyStore for CasbinPolicyStore {
    fn backend_name(&self) -> &'static str {
        "casbin"
    }

    async fn enforce(&self, role: &str, path: &str, method: &str) -> Result<bool, PolicyError> {
        self.enforcer
            .read()
            .await
            .enforce((role, path, method))
            .map_err(|e| PolicyError::Evaluation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::services::auth::policy::PolicyEnforcer;
    use crate::services::auth::roles::RoleSet;

    fn shipped(file: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("config").join(file)
    }

    async fn shipped_store() -> CasbinPolicyStore {
        CasbinPolicyStore::load(&shipped("rbac_model.conf"), &shipped("rbac_policy.csv"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn shipped_policy_grants_and_denies() {
        let store = shipped_store().await;

        assert!(store.enforce("anonymous", "/api/v1/u/login", "POST").await.unwrap());
        assert!(!store.enforce("anonymous", "/api/v1/users", "GET").await.unwrap());
        assert!(store.enforce("admin", "/api/v1/users", "POST").await.unwrap());
        assert!(store.enforce("admin", "/api/v1/users/42", "DELETE").await.unwrap());
        assert!(!store.enforce("admin", "/api/v1/users/42", "PATCH").await.unwrap());
        assert!(!store.enforce("class_teacher", "/api/v1/users", "GET").await.unwrap());
    }

    #[tokio::test]
    async fn admin_inherits_class_teacher_rules() {
        let store = shipped_store().await;

        assert!(store.enforce("admin", "/api/v1/u/logout", "POST").await.unwrap());
    }

    #[tokio::test]
    async fn enforcer_normalizes_before_casbin_sees_the_path() {
        let enforcer = PolicyEnforcer::new(Arc::new(shipped_store().await));
        let admin = RoleSet::from_delimited("admin");

        assert!(enforcer.is_allowed_any(&admin, "/api/v1/users/", "GET").await.unwrap());
        assert!(enforcer.is_allowed_any(&admin, "/api/v1/users", "GET").await.unwrap());
    }

    #[tokio::test]
    async fn missing_files_fail_to_load() {
        let err = CasbinPolicyStore::load(&shipped("nope.conf"), &shipped("rbac_policy.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::Load(_)));
    }

    #[tokio::test]
    async fn reload_keeps_serving() {
        let store = shipped_store().await;
        store.reload().await.unwrap();

        assert!(store.enforce("anonymous", "/api/v1/health", "GET").await.unwrap());
    }
}
