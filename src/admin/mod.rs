//! Admin API.
//!
//! Operational view of and control over the live routing table. Served on
//! its own listener and protected by a bearer token.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/aliases", get(get_aliases))
        .route("/admin/filters", get(get_filters))
        .route("/admin/shutdown", post(mark_shutdown).delete(unmark_shutdown))
        .route("/admin/modules/{id}", delete(unload_module))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::handler::InitParams;
    use crate::handler::ResourceHandler;
    use crate::handler::DirectoryContext;
    use crate::routing::Router as AliasRouter;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let mut config = RouterConfig::default();
        config.admin.api_key = "secret".into();
        let router = Arc::new(AliasRouter::default());
        router
            .register(
                "/docs",
                Arc::new(ResourceHandler::new("", Arc::new(DirectoryContext::new(".")))),
                &InitParams::new(),
                "docs",
            )
            .unwrap();
        AppState::new(router, &config)
    }

    fn request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_requires_token() {
        let app = setup_admin_router(state());
        let resp = app
            .clone()
            .oneshot(request(Method::GET, "/admin/status", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(request(Method::GET, "/admin/status", Some("wrong")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_status_and_aliases() {
        let app = setup_admin_router(state());

        let resp = app
            .clone()
            .oneshot(request(Method::GET, "/admin/status", Some("secret")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(resp).await;
        assert_eq!(body["aliases"], 1);
        assert_eq!(body["shutdown_requested"], false);

        let resp = app
            .oneshot(request(Method::GET, "/admin/aliases?prefix=/docs", Some("secret")))
            .await
            .unwrap();
        let body = json(resp).await;
        assert_eq!(body[0]["alias"], "/docs");
        assert_eq!(body[0]["owner"], "docs");
        assert_eq!(body[0]["kind"], "resource");
    }

    #[tokio::test]
    async fn test_shutdown_toggle() {
        let state = state();
        let router = state.router.clone();
        let app = setup_admin_router(state);

        let resp = app
            .clone()
            .oneshot(request(Method::POST, "/admin/shutdown", Some("secret")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(router.is_shutdown_requested());

        app.oneshot(request(Method::DELETE, "/admin/shutdown", Some("secret")))
            .await
            .unwrap();
        assert!(!router.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_unload_module() {
        let state = state();
        let router = state.router.clone();
        let app = setup_admin_router(state);

        let resp = app
            .clone()
            .oneshot(request(Method::DELETE, "/admin/modules/docs", Some("secret")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json(resp).await["aliases_removed"], 1);
        assert!(router.lookup("/docs").is_none());

        let resp = app
            .oneshot(request(Method::DELETE, "/admin/modules/docs", Some("secret")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
