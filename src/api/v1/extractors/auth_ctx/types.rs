/*
 * Responsibility
 * - Handler から見える「認可済みコンテキスト」の型
 * - middleware が request extensions に格納し、handler はこの型だけを受け取る
 */
use crate::services::auth::RequestAuthContext;
use crate::services::identity::Identity;

/// Context of a request that passed the policy, anonymous or not.
#[derive(Debug, Clone)]
pub struct AuthContext(pub RequestAuthContext);

/// Logged-in identity of the current request. Rejects anonymous requests.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Identity);
