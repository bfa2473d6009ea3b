//! HTTP router shared by the whole service.

use crate::config::RouterOptions;
use crate::error::{ResourceKind, Result, ServiceError};
use axum::Router;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

type Middleware = Box<dyn Fn(Router) -> Router + Send + Sync>;

/// The service router.
///
/// Route groups and middleware can be attached at any time before serving.
/// Middleware is applied when the router is materialised with
/// [`RouterHandle::build`], so it wraps every group regardless of the order
/// in which groups and middleware were registered.
pub struct RouterHandle {
    routes: Mutex<Router>,
    middleware: Mutex<Vec<Middleware>>,
    trace_requests: bool,
    cors: Option<CorsLayer>,
}

impl RouterHandle {
    pub(crate) fn new(options: Option<&RouterOptions>) -> Self {
        let options = options.cloned().unwrap_or_else(RouterOptions::bare);
        Self {
            routes: Mutex::new(Router::new()),
            middleware: Mutex::new(Vec::new()),
            trace_requests: options.trace_requests,
            cors: options.cors,
        }
    }

    /// Mount `routes` under `path`. `/` merges them at the root.
    pub fn group(&self, path: &str, routes: Router) -> Result<()> {
        if !path.starts_with('/') {
            return Err(ServiceError::setup(
                ResourceKind::Router,
                format!("route group path {path:?} must start with '/'"),
            ));
        }

        let mut router = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let current = router.clone();
        let trimmed = path.trim_end_matches('/');

        // axum panics on overlapping routes; the registered groups must survive that.
        let next = panic::catch_unwind(AssertUnwindSafe(|| {
            if trimmed.is_empty() {
                current.merge(routes)
            } else {
                current.nest(trimmed, routes)
            }
        }))
        .map_err(|payload| {
            ServiceError::setup(
                ResourceKind::Router,
                format!(
                    "can't register route group {path:?}: {}",
                    panic_message(payload.as_ref())
                ),
            )
        })?;

        *router = next;
        tracing::debug!("Registered route group {}", path);
        Ok(())
    }

    /// Register a router transform, typically `|router| router.layer(...)`.
    pub fn use_middleware<F>(&self, middleware: F)
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        self.middleware
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(middleware));
    }

    /// Produce the servable router: every group plus every middleware.
    pub fn build(&self) -> Router {
        let mut router = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for middleware in self
            .middleware
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            router = middleware(router);
        }

        if let Some(cors) = &self.cors {
            router = router.layer(cors.clone());
        }
        if self.trace_requests {
            router = router.layer(TraceLayer::new_for_http());
        }
        router
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("conflicting routes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::routing::get;
    use tower::ServiceExt;

    async fn pong() -> &'static str {
        "pong"
    }

    #[tokio::test]
    async fn test_group_is_routable() {
        let handle = RouterHandle::new(None);
        handle
            .group("/v1/ping/", Router::new().route("/", get(pong)))
            .unwrap();

        let response = handle
            .build()
            .oneshot(Request::get("/v1/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_group_path_must_be_absolute() {
        let handle = RouterHandle::new(None);
        let err = handle.group("v1/ping", Router::new()).unwrap_err();
        assert_eq!(err.kind(), ResourceKind::Router);
    }

    #[tokio::test]
    async fn test_conflicting_group_keeps_registered_routes() {
        let handle = RouterHandle::new(None);
        handle
            .group("/", Router::new().route("/health", get(pong)))
            .unwrap();
        handle
            .group("/v1", Router::new().route("/a", get(pong)))
            .unwrap();

        let err = handle
            .group("/", Router::new().route("/health", get(pong)))
            .unwrap_err();
        assert!(err.is(ResourceKind::Router, crate::error::Condition::SetupFailed));

        let app = handle.build();
        for uri in ["/health", "/v1/a"] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_default_options_add_cors() {
        let handle = RouterHandle::new(Some(&RouterOptions::default()));
        handle
            .group("/", Router::new().route("/health", get(pong)))
            .unwrap();

        let response = handle
            .build()
            .oneshot(
                Request::get("/health")
                    .header(header::ORIGIN, "https://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        );
    }

    #[tokio::test]
    async fn test_middleware_wraps_groups_added_later() {
        let handle = RouterHandle::new(None);
        handle.use_middleware(|router| {
            router.layer(axum::middleware::map_response(
                |mut response: axum::response::Response| async move {
                    response
                        .headers_mut()
                        .insert("x-served-by", "keystone".parse().unwrap());
                    response
                },
            ))
        });
        handle
            .group("/late", Router::new().route("/", get(pong)))
            .unwrap();

        let response = handle
            .build()
            .oneshot(Request::get("/late").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()["x-served-by"], "keystone");
    }
}
