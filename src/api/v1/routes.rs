/*
 * Responsibility
 * - v1 の URL 構造を定義 (RouteTable に登録)
 * - /health, /u/{login,logout,session}, /users
 * - 認可は全 route 共通で app 側の auth middleware が担う
 */
use axum::Router;

use crate::api::route_table::{RouteMethod, RouteTable};
use crate::state::AppState;

use crate::api::v1::handlers::{
    health::health,
    session::{login, logout, session_info},
    users::{create_user, delete_user, get_user, list_users, update_user},
};

pub fn route_table() -> RouteTable<AppState> {
    RouteTable::new()
        .add("/health", RouteMethod::Get, health)
        .add("/u/login", RouteMethod::Post, login)
        .add("/u/logout", RouteMethod::Post, logout)
        .add("/u/session", RouteMethod::Get, session_info)
        .add("/users", RouteMethod::Get, list_users)
        .add("/users", RouteMethod::Post, create_user)
        .add("/users/{user_id}", RouteMethod::Get, get_user)
        .add("/users/{user_id}", RouteMethod::Put, update_user)
        .add("/users/{user_id}", RouteMethod::Delete, delete_user)
}

pub fn routes() -> Router<AppState> {
    route_table().into_router()
}
