use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::services::auth::RequestAuthContext;

use super::{AuthContext, CurrentIdentity};

/// Missing context means the auth middleware was not applied: reject with 401.
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestAuthContext>()
            .cloned()
            .map(AuthContext)
            .ok_or(AppError::Unauthorized)
    }
}

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestAuthContext>()
            .and_then(|ctx| ctx.identity.clone())
            .map(CurrentIdentity)
            .ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;
    use crate::services::auth::RoleSet;
    use crate::services::identity::test_identity;

    fn parts_with(ctx: Option<RequestAuthContext>) -> Parts {
        let mut req = Request::builder().uri("/").body(()).unwrap();
        if let Some(ctx) = ctx {
            req.extensions_mut().insert(ctx);
        }
        req.into_parts().0
    }

    #[tokio::test]
    async fn missing_context_is_unauthorized() {
        let mut parts = parts_with(None);
        let res = AuthContext::from_request_parts(&mut parts, &()).await;
        assert!(matches!(res, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn anonymous_context_has_no_current_identity() {
        let ctx = RequestAuthContext {
            identity: None,
            roles: RoleSet::anonymous(),
        };

        let mut parts = parts_with(Some(ctx.clone()));
        let AuthContext(found) = AuthContext::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(found.roles.is_anonymous());

        let mut parts = parts_with(Some(ctx));
        let res = CurrentIdentity::from_request_parts(&mut parts, &()).await;
        assert!(matches!(res, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn logged_in_context_yields_identity() {
        let identity = test_identity("tina", "class_teacher");
        let mut parts = parts_with(Some(RequestAuthContext {
            roles: identity.role_set(),
            identity: Some(identity),
        }));

        let CurrentIdentity(found) = CurrentIdentity::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(found.username, "tina");
    }
}
