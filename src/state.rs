/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - identities: IdentityService (user lifecycle / login)
 *   - auth: AuthChain (session → roles → policy)
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::sync::Arc;

use crate::services::auth::AuthChain;
use crate::services::identity::IdentityService;

#[derive(Clone, Debug)]
pub struct AppState {
    pub identities: Arc<IdentityService>,
    pub auth: Arc<AuthChain>,
}

impl AppState {
    pub fn new(identities: Arc<IdentityService>, auth: Arc<AuthChain>) -> Self {
        Self { identities, auth }
    }
}
