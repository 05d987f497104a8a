//! Typed route registration.
//!
//! Every endpoint is declared as a `RouteResource` (path, method, handler).
//! The table is the single place that knows which routes exist, so it can be
//! listed and checked against the access policy.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use axum::{
    Router,
    handler::Handler,
    routing::{MethodFilter, MethodRouter, on},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl RouteMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteMethod::Get => "GET",
            RouteMethod::Post => "POST",
            RouteMethod::Put => "PUT",
            RouteMethod::Patch => "PATCH",
            RouteMethod::Delete => "DELETE",
        }
    }

    fn filter(self) -> MethodFilter {
        match self {
            RouteMethod::Get => MethodFilter::GET,
            RouteMethod::Post => MethodFilter::POST,
            RouteMethod::Put => MethodFilter::PUT,
            RouteMethod::Patch => MethodFilter::PATCH,
            RouteMethod::Delete => MethodFilter::DELETE,
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct RouteResource<S> {
    pub path: &'static str,
    pub method: RouteMethod,
    route: MethodRouter<S>,
}

impl<S> RouteResource<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new<H, T>(path: &'static str, method: RouteMethod, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        Self {
            path,
            method,
            route: on(method.filter(), handler),
        }
    }
}

pub struct RouteTable<S> {
    resources: Vec<RouteResource<S>>,
}

impl<S> Default for RouteTable<S> {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
        }
    }
}

impl<S> RouteTable<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<H, T>(mut self, path: &'static str, method: RouteMethod, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.resources
            .push(RouteResource::new(path, method, handler));
        self
    }

    /// `(method, path)` pairs in registration order.
    pub fn entries(&self) -> impl Iterator<Item = (RouteMethod, &'static str)> + '_ {
        self.resources.iter().map(|r| (r.method, r.path))
    }

    /// Merge the resources into a router, one `route` call per path.
    /// A repeated `(method, path)` keeps the first registration.
    pub fn into_router(self) -> Router<S> {
        let mut seen = HashSet::new();
        let mut by_path: BTreeMap<&'static str, MethodRouter<S>> = BTreeMap::new();

        for resource in self.resources {
            if !seen.insert((resource.method, resource.path)) {
                tracing::warn!(
                    method = %resource.method,
                    path = resource.path,
                    "duplicate route ignored"
                );
                continue;
            }

            let merged = match by_path.remove(resource.path) {
                Some(existing) => existing.merge(resource.route),
                None => resource.route,
            };
            by_path.insert(resource.path, merged);
        }

        by_path
            .into_iter()
            .fold(Router::new(), |router, (path, route)| router.route(path, route))
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;

    async fn first() -> &'static str {
        "first"
    }

    async fn second() -> &'static str {
        "second"
    }

    fn table() -> RouteTable<()> {
        RouteTable::new()
            .add("/items", RouteMethod::Get, first)
            .add("/items", RouteMethod::Post, second)
            .add("/items", RouteMethod::Get, second)
    }

    async fn call(router: Router, method: &str, uri: &str) -> (StatusCode, String) {
        let resp = router
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn entries_keep_registration_order() {
        let entries: Vec<_> = table().entries().collect();
        assert_eq!(
            entries,
            vec![
                (RouteMethod::Get, "/items"),
                (RouteMethod::Post, "/items"),
                (RouteMethod::Get, "/items"),
            ]
        );
    }

    #[tokio::test]
    async fn methods_on_one_path_are_merged() {
        let router = table().into_router();

        assert_eq!(call(router.clone(), "GET", "/items").await, (StatusCode::OK, "first".into()));
        assert_eq!(call(router.clone(), "POST", "/items").await, (StatusCode::OK, "second".into()));
        assert_eq!(
            call(router, "DELETE", "/items").await.0,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
