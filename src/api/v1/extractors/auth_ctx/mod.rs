/*!
 * Authentication context extractor
 *
 * Responsibility:
 * - auth middleware が通した RequestAuthContext を handler に提供する
 * - axum 依存は core に閉じ込め、型定義は types に分離する
 *
 * Public API:
 * - AuthContext (anonymous も含む)
 * - CurrentIdentity (ログイン済みのみ)
 */

mod core;
mod types;

pub use types::{AuthContext, CurrentIdentity};
