/*
 * Responsibility
 * - API version ごとの Router 公開
 * - route_table: method + path + handler の登録表 (型付き)
 */
pub mod route_table;
pub mod v1;
