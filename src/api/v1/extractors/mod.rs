/*
 * Responsibility
 * - handler 向け extractor の公開
 */
mod auth_ctx;

pub use auth_ctx::{AuthContext, CurrentIdentity};
