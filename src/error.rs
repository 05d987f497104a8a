/*
 * Responsibility
 * - アプリ共通の AppError 定義
 * - IntoResponse 実装 (HTTP status / JSON error body)
 * - identity / password / session / repo error を統一的に変換
 * - 認可失敗はどの段階で落ちたかを返さない (常に generic な unauthorized)
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::repos::error::RepoError;
use crate::services::auth::{PasswordError, PolicyError, SessionError};
use crate::services::identity::{FieldError, IdentityError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{code}: {message}")]
    BadRequest { code: &'static str, message: String },
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found: {resource}")]
    NotFound { resource: &'static str },
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("{code}: {message}")]
    Unprocessable {
        code: &'static str,
        message: String,
        fields: Vec<FieldError>,
    },
    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &'static str) -> Self {
        Self::NotFound { resource }
    }

    pub fn unprocessable(code: &'static str, message: impl Into<String>) -> Self {
        Self::Unprocessable {
            code,
            message: message.into(),
            fields: Vec::new(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, fields) = match self {
            AppError::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, code, message, Vec::new())
            }
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "unauthorized".into(),
                Vec::new(),
            ),
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{resource} not found."),
                Vec::new(),
            ),
            AppError::Conflict { message } => (StatusCode::CONFLICT, "CONFLICT", message, Vec::new()),
            AppError::Unprocessable {
                code,
                message,
                fields,
            } => (StatusCode::UNPROCESSABLE_ENTITY, code, message, fields),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "internal server error".into(),
                Vec::new(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message,
                fields,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Conflict => AppError::Conflict {
                message: "already exists".into(),
            },
            RepoError::Db(err) => {
                tracing::error!(error = ?err, "database error");
                AppError::Internal
            }
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(e: PasswordError) -> Self {
        tracing::error!(error = %e, "password hashing error");
        AppError::Internal
    }
}

impl From<IdentityError> for AppError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Validation(errors) => AppError::Unprocessable {
                code: "VALIDATION_FAILED",
                message: "validation failed".into(),
                fields: errors.errors,
            },
            IdentityError::NotFound => AppError::not_found("user"),
            IdentityError::Protected { .. } => {
                AppError::unprocessable("PROTECTED_IDENTITY", "administrators can not be deleted")
            }
            IdentityError::InvalidCredentials => AppError::Unauthorized,
            IdentityError::Password(err) => err.into(),
            IdentityError::Store(err) => err.into(),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::MalformedToken | SessionError::NotFound => AppError::Unauthorized,
            SessionError::Store(err) => err.into(),
        }
    }
}

impl From<PolicyError> for AppError {
    fn from(e: PolicyError) -> Self {
        tracing::error!(error = %e, "policy error");
        AppError::Unauthorized
    }
}

impl From<ConfigError> for AppError {
    fn from(_: ConfigError) -> Self {
        AppError::Internal
    }
}
