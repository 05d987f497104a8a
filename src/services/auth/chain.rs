//! Per-request authorization pipeline.
//!
//! ```text
//! Start → SessionResolved → RolesComputed → Allowed | Denied
//! ```
//!
//! Stages run strictly in this order. A stale or tampered session token
//! degrades to anonymous (and must be cleared by the caller); it is not a hard
//! error. Only an unreachable identity store aborts the request.

use tracing::{debug, warn};

use crate::services::auth::policy::PolicyEnforcer;
use crate::services::auth::roles::{RoleSet, extract_roles};
use crate::services::auth::session::{SessionError, SessionResolver};
use crate::services::identity::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    Start,
    SessionResolved,
    RolesComputed,
    Allowed,
    Denied,
}

/// Request-scoped authentication state. Built fresh for every request and
/// handed to handlers through request extensions; never cached.
#[derive(Debug, Clone)]
pub struct RequestAuthContext {
    pub identity: Option<Identity>,
    pub roles: RoleSet,
}

impl RequestAuthContext {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

#[derive(Debug)]
pub enum AuthOutcome {
    Allowed(RequestAuthContext),
    Denied,
}

#[derive(Debug)]
pub struct AuthEvaluation {
    pub outcome: AuthOutcome,
    /// The presented session token was invalid and must be dropped.
    pub clear_session: bool,
    /// Last stage reached.
    pub stage: AuthStage,
}

#[derive(Debug, Clone)]
pub struct AuthChain {
    resolver: SessionResolver,
    enforcer: PolicyEnforcer,
}

impl AuthChain {
    pub fn new(resolver: SessionResolver, enforcer: PolicyEnforcer) -> Self {
        Self { resolver, enforcer }
    }

    pub fn enforcer(&self) -> &PolicyEnforcer {
        &self.enforcer
    }

    pub async fn evaluate(
        &self,
        token: Option<&str>,
        path: &str,
        method: &str,
    ) -> Result<AuthEvaluation, SessionError> {
        let mut stage = AuthStage::Start;
        debug!(?stage, path, method, "authorizing request");

        let (identity, clear_session) = match self.resolver.resolve(token).await {
            Ok(identity) => (identity, false),
            Err(err) if err.clears_session() => {
                warn!(error = %err, "invalid session, continuing as anonymous");
                (None, true)
            }
            Err(err) => return Err(err),
        };
        stage = AuthStage::SessionResolved;
        debug!(?stage, authenticated = identity.is_some(), "session resolved");

        let roles = extract_roles(identity.as_ref());
        stage = AuthStage::RolesComputed;
        debug!(?stage, roles = %roles.to_delimited(), "roles computed");

        let outcome = if self.enforcer.permits(&roles, path, method).await {
            stage = AuthStage::Allowed;
            AuthOutcome::Allowed(RequestAuthContext { identity, roles })
        } else {
            stage = AuthStage::Denied;
            warn!(path, method, roles = %roles.to_delimited(), "request denied by policy");
            AuthOutcome::Denied
        };

        Ok(AuthEvaluation {
            outcome,
            clear_session,
            stage,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::repos::error::{RepoError, RepoResult};
    use crate::services::auth::policy::{MemoryPolicyStore, PolicyRule};
    use crate::services::identity::{
        IdentityStore, MemoryIdentityStore, NewIdentityRecord,
    };

    async fn chain_with(roles: &str, rules: Vec<PolicyRule>) -> (AuthChain, Uuid) {
        let store = Arc::new(MemoryIdentityStore::new());
        let identity = store
            .create(NewIdentityRecord {
                username: "tina".into(),
                email: "tina".into(),
                password_hash: String::new(),
                roles: roles.into(),
            })
            .await
            .unwrap();
        let token = Uuid::new_v4();
        store
            .set_session(identity.id, Some(token))
            .await
            .unwrap();

        let chain = AuthChain::new(
            SessionResolver::new(store),
            PolicyEnforcer::new(Arc::new(MemoryPolicyStore::new(rules))),
        );
        (chain, token)
    }

    #[tokio::test]
    async fn teacher_may_read_but_not_delete() {
        let (chain, token) =
            chain_with("teacher", vec![PolicyRule::allow("teacher", "/d/", "GET")]).await;
        let token = token.to_string();

        let get = chain.evaluate(Some(&token), "/d/", "GET").await.unwrap();
        assert_eq!(get.stage, AuthStage::Allowed);
        let AuthOutcome::Allowed(ctx) = get.outcome else {
            panic!("expected allow");
        };
        assert_eq!(ctx.identity.unwrap().username, "tina");
        assert!(ctx.roles.contains("teacher"));

        let delete = chain.evaluate(Some(&token), "/d/", "DELETE").await.unwrap();
        assert_eq!(delete.stage, AuthStage::Denied);
        assert!(matches!(delete.outcome, AuthOutcome::Denied));
        assert!(!delete.clear_session);
    }

    #[tokio::test]
    async fn unknown_token_degrades_to_anonymous_and_clears() {
        let (chain, _) = chain_with(
            "teacher",
            vec![
                PolicyRule::allow("teacher", "/d", "GET"),
                PolicyRule::allow("anonymous", "/login", "GET"),
            ],
        )
        .await;
        let stale = Uuid::new_v4().to_string();

        let denied = chain.evaluate(Some(&stale), "/d", "GET").await.unwrap();
        assert!(matches!(denied.outcome, AuthOutcome::Denied));
        assert!(denied.clear_session);

        let public = chain.evaluate(Some(&stale), "/login", "GET").await.unwrap();
        let AuthOutcome::Allowed(ctx) = public.outcome else {
            panic!("expected allow");
        };
        assert!(!ctx.is_authenticated());
        assert!(ctx.roles.is_anonymous());
        assert!(public.clear_session);
    }

    #[tokio::test]
    async fn malformed_token_clears_session() {
        let (chain, _) = chain_with("teacher", vec![]).await;

        let eval = chain.evaluate(Some("garbage"), "/d", "GET").await.unwrap();
        assert!(eval.clear_session);
        assert!(matches!(eval.outcome, AuthOutcome::Denied));
    }

    #[tokio::test]
    async fn role_less_identity_gets_anonymous_rules_only() {
        let (chain, token) = chain_with(
            "",
            vec![
                PolicyRule::allow("anonymous", "/", "GET"),
                PolicyRule::allow("teacher", "/d", "GET"),
            ],
        )
        .await;
        let token = token.to_string();

        let home = chain.evaluate(Some(&token), "/", "GET").await.unwrap();
        assert!(matches!(home.outcome, AuthOutcome::Allowed(_)));

        let d = chain.evaluate(Some(&token), "/d", "GET").await.unwrap();
        assert!(matches!(d.outcome, AuthOutcome::Denied));
    }

    struct DownStore;

    #[async_trait]
    impl IdentityStore for DownStore {
        fn backend_name(&self) -> &'static str {
            "down"
        }
        async fn find(&self, _: Uuid) -> RepoResult<Option<Identity>> {
            Err(RepoError::Conflict)
        }
        async fn find_by_session(&self, _: Uuid) -> RepoResult<Option<Identity>> {
            Err(RepoError::Db(sqlx::Error::PoolTimedOut))
        }
        async fn find_by_username(&self, _: &str) -> RepoResult<Option<Identity>> {
            Ok(None)
        }
        async fn list(&self) -> RepoResult<Vec<Identity>> {
            Ok(vec![])
        }
        async fn create(&self, _: NewIdentityRecord) -> RepoResult<Identity> {
            Err(RepoError::Conflict)
        }
        async fn update(&self, _: &Identity) -> RepoResult<Option<Identity>> {
            Ok(None)
        }
        async fn set_session(&self, _: Uuid, _: Option<Uuid>) -> RepoResult<Option<Identity>> {
            Ok(None)
        }
        async fn set_password_hash(&self, _: Uuid, _: &str) -> RepoResult<Option<Identity>> {
            Ok(None)
        }
        async fn destroy(&self, _: Uuid) -> RepoResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn store_outage_aborts_instead_of_allowing() {
        let chain = AuthChain::new(
            SessionResolver::new(Arc::new(DownStore)),
            PolicyEnforcer::new(Arc::new(MemoryPolicyStore::new(vec![PolicyRule::allow(
                "anonymous", "/", "GET",
            )]))),
        );
        let token = Uuid::new_v4().to_string();

        assert!(matches!(
            chain.evaluate(Some(&token), "/", "GET").await,
            Err(SessionError::Store(_))
        ));
    }
}
