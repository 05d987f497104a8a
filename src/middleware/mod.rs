/*
 * Responsibility
 * - middleware の公開インターフェース
 * - auth: session → roles → policy の認可 chain
 * - http: request-id / trace / body limit / timeout
 */
pub mod auth;
pub mod http;
