//! Session cookie → Identity → roles → policy decision.
//!
//! Runs on every request. On allow, the `RequestAuthContext` is put into
//! request extensions for the `AuthContext` extractor; on deny the request
//! ends with a generic 401 and the handler is never reached.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tower_sessions::Session;

use crate::error::AppError;
use crate::services::auth::{AuthOutcome, SESSION_TOKEN_KEY};
use crate::state::AppState;

pub async fn authorize(
    State(state): State<AppState>,
    session: Session,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    // A value that does not decode as a string is treated like a tampered token.
    let (token, undecodable) = match session.get::<String>(SESSION_TOKEN_KEY).await {
        Ok(token) => (token, false),
        Err(err) => {
            tracing::warn!(error = %err, "session value could not be read");
            (None, true)
        }
    };

    let path = req.uri().path().to_owned();
    let method = req.method().as_str().to_owned();

    let evaluation = state
        .auth
        .evaluate(token.as_deref(), &path, &method)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, %path, %method, "authorization aborted");
            AppError::Internal
        })?;

    if evaluation.clear_session || undecodable {
        session.remove_value(SESSION_TOKEN_KEY).await.map_err(|err| {
            tracing::error!(error = %err, "clearing session failed");
            AppError::Internal
        })?;
    }

    match evaluation.outcome {
        AuthOutcome::Allowed(ctx) => {
            req.extensions_mut().insert(ctx);
            Ok(next.run(req).await)
        }
        AuthOutcome::Denied => Err(AppError::Unauthorized),
    }
}
