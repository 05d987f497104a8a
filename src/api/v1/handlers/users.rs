/*
 * Responsibility
 * - /users 系 CRUD handler (admin 向け、認可は middleware 済み)
 * - Path/Json を extractor で受け、DTO validation → IdentityService 呼び出し
 * - DELETE は IdentityService 経由のみ (admin 保護)
 */
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    api::v1::dto::users::{
        CreateUserRequest, CreateUserResponse, UpdateUserRequest, UserResponse,
    },
    error::AppError,
    state::AppState,
};

fn parse_user_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::bad_request("INVALID_ID", "user_id must be a UUID"))
}

pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let identities = state.identities.list().await?;
    Ok(Json(identities.into_iter().map(UserResponse::from).collect()))
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreateUserResponse>), AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_REQUEST", msg))?;

    let created = state.identities.create(req.into()).await?;

    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let identity = state.identities.get(parse_user_id(&user_id)?).await?;
    Ok(Json(identity.into()))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user_id = parse_user_id(&user_id)?;
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_REQUEST", msg))?;

    let identity = state.identities.update(user_id, req.into()).await?;
    Ok(Json(identity.into()))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.identities.destroy(parse_user_id(&user_id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
