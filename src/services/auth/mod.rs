pub mod casbin_store;
pub mod chain;
pub mod password;
pub mod policy;
pub mod roles;
pub mod session;

pub use casbin_store::CasbinPolicyStore;
pub use chain::{AuthChain, AuthEvaluation, AuthOutcome, AuthStage, RequestAuthContext};
pub use password::{HashParams, PasswordError, PasswordHasher};
pub use policy::{MemoryPolicyStore, PolicyEnforcer, PolicyError, PolicyRule, PolicyStore};
pub use roles::{ANONYMOUS_ROLE, RoleSet, extract_roles};
pub use session::{SESSION_TOKEN_KEY, SessionError, SessionResolver};
