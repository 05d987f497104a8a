/*
 * Responsibility
 * - POST /u/login: 認証 → session id を cycle → token を session に保存
 * - POST /u/logout: identity の session id と session state を破棄
 * - GET /u/session: 現在の identity と roles
 */
use axum::{Json, extract::State, http::StatusCode};
use tower_sessions::Session;

use crate::api::v1::dto::session::{LoginRequest, SessionResponse};
use crate::api::v1::dto::users::UserResponse;
use crate::api::v1::extractors::{AuthContext, CurrentIdentity};
use crate::error::AppError;
use crate::services::auth::SESSION_TOKEN_KEY;
use crate::services::identity::IdentityError;
use crate::state::AppState;

fn session_failure(err: tower_sessions::session::Error) -> AppError {
    tracing::error!(error = %err, "session store failure");
    AppError::Internal
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_REQUEST", msg))?;

    let identity = state
        .identities
        .authenticate(&req.username, &req.password)
        .await
        .inspect_err(|err| tracing::warn!(username = %req.username, error = %err, "login failed"))?;

    // New server-side id before the token is stored.
    session.cycle_id().await.map_err(session_failure)?;

    let identity = state.identities.start_session(identity).await?;
    let Some(token) = identity.session_id else {
        return Err(AppError::Internal);
    };
    session
        .insert(SESSION_TOKEN_KEY, token.to_string())
        .await
        .map_err(session_failure)?;

    tracing::info!(username = %identity.username, "logged in");

    Ok(Json(SessionResponse {
        authenticated: true,
        roles: identity.role_set(),
        user: Some(UserResponse::from(identity)),
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    session: Session,
) -> Result<StatusCode, AppError> {
    match state.identities.end_session(identity.id).await {
        Ok(()) | Err(IdentityError::NotFound) => {}
        Err(err) => return Err(err.into()),
    }
    session.flush().await.map_err(session_failure)?;

    tracing::info!(username = %identity.username, "logged out");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn session_info(AuthContext(ctx): AuthContext) -> Json<SessionResponse> {
    Json(ctx.into())
}
