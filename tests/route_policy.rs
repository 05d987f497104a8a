//! The shipped policy table covers every registered route.

use std::path::PathBuf;
use std::sync::Arc;

use elternabend::api::v1::route_table;
use elternabend::services::auth::{CasbinPolicyStore, PolicyEnforcer, RoleSet};
use uuid::Uuid;

async fn shipped_enforcer() -> PolicyEnforcer {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config");
    let store = CasbinPolicyStore::load(&dir.join("rbac_model.conf"), &dir.join("rbac_policy.csv"))
        .await
        .unwrap();
    PolicyEnforcer::new(Arc::new(store))
}

fn concrete(path: &str) -> String {
    format!("/api/v1{}", path.replace("{user_id}", &Uuid::new_v4().to_string()))
}

#[tokio::test]
async fn every_route_is_granted_to_some_role() {
    let enforcer = shipped_enforcer().await;
    let everyone = RoleSet::from_names(["anonymous", "admin"]);

    for (method, path) in route_table().entries() {
        let path = concrete(path);
        assert!(
            enforcer.permits(&everyone, &path, method.as_str()).await,
            "{method} {path} is unreachable"
        );
    }
}

#[tokio::test]
async fn user_management_is_admin_only() {
    let enforcer = shipped_enforcer().await;
    let teacher = RoleSet::from_names(["class_teacher"]);
    let anonymous = RoleSet::anonymous();

    for (method, path) in route_table().entries() {
        if !path.starts_with("/users") {
            continue;
        }
        let path = concrete(path);
        assert!(!enforcer.permits(&teacher, &path, method.as_str()).await, "{method} {path}");
        assert!(!enforcer.permits(&anonymous, &path, method.as_str()).await, "{method} {path}");
    }
}
