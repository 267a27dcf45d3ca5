//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum app: one catch-all route into the dispatcher
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Bound concurrent in-flight requests
//! - Serve the admin API on its own listener
//! - Apply config reloads to the registered modules
//! - Coordinate shutdown: 503 for new work, drain, then stop the router

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request, Response, StatusCode},
    response::IntoResponse,
    routing::any,
    Router as AxumRouter,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::config::RouterConfig;
use crate::lifecycle::Shutdown;
use crate::module::{ModuleError, ModuleLoader};
use crate::routing::{Dispatcher, Router};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub dispatcher: Dispatcher,
    pub modules: Arc<Mutex<ModuleLoader>>,
    pub admin_api_key: Arc<str>,
    pub limit: Arc<Semaphore>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(router: Arc<Router>, config: &RouterConfig) -> Self {
        Self {
            dispatcher: router.dispatcher(),
            modules: Arc::new(Mutex::new(ModuleLoader::new(Arc::clone(&router)))),
            admin_api_key: Arc::from(config.admin.api_key.as_str()),
            limit: Arc::new(Semaphore::new(config.listener.max_connections)),
            started_at: Instant::now(),
            router,
        }
    }

    /// Stop admitting new work for good: the dispatcher answers 503 and
    /// requests still queued for a dispatch slot are turned away.
    pub fn begin_shutdown(&self) {
        self.router.mark_shutdown_requested();
        self.limit.close();
    }
}

/// HTTP front end for the router.
pub struct HttpServer {
    app: AxumRouter,
    admin: AxumRouter,
    state: AppState,
    config: RouterConfig,
}

impl HttpServer {
    /// Create a new HTTP server for `router`.
    pub fn new(config: RouterConfig, router: Arc<Router>) -> Self {
        let state = AppState::new(router, &config);
        let app = Self::build_app(&config, state.clone());
        let admin = setup_admin_router(state.clone());
        Self {
            app,
            admin,
            state,
            config,
        }
    }

    /// Build the Axum app with all middleware layers.
    #[allow(deprecated)]
    fn build_app(config: &RouterConfig, state: AppState) -> AxumRouter {
        let server_name = HeaderValue::from_str(&config.error_pages.server_name)
            .unwrap_or_else(|_| HeaderValue::from_static("hotswap-router"));

        AxumRouter::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(SetResponseHeaderLayer::if_not_present(header::SERVER, server_name))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.state.router
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Register the modules declared in the configuration.
    pub async fn load_modules(&self) -> Vec<ModuleError> {
        self.state.modules.lock().await.load_all(&self.config.modules).await
    }

    /// Run until `shutdown` fires.
    ///
    /// On shutdown new requests get 503, the listeners drain, and finally
    /// every registration is stopped.
    pub async fn run(
        self,
        listener: TcpListener,
        admin_listener: Option<TcpListener>,
        updates: Option<mpsc::UnboundedReceiver<RouterConfig>>,
        shutdown: &Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reload_task = updates.map(|rx| {
            tokio::spawn(apply_reloads(
                rx,
                Arc::clone(&self.state.modules),
                self.config.clone(),
                shutdown.subscribe(),
            ))
        });

        let admin_task = match admin_listener {
            Some(admin_listener) => {
                let admin_addr = admin_listener.local_addr()?;
                tracing::info!(address = %admin_addr, "Admin API listening");
                let admin_shutdown = shutdown.clone();
                let admin = self.admin;
                Some(tokio::spawn(async move {
                    axum::serve(admin_listener, admin)
                        .with_graceful_shutdown(async move { admin_shutdown.triggered().await })
                        .await
                }))
            }
            None => None,
        };

        let state = self.state.clone();
        let serve_shutdown = shutdown.clone();
        let app = self.app.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                serve_shutdown.triggered().await;
                state.begin_shutdown();
                tracing::info!("Shutdown requested, draining connections");
            })
            .await?;

        if let Some(task) = reload_task {
            task.abort();
        }
        if let Some(task) = admin_task {
            match task.await {
                Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
                Err(e) => tracing::error!(error = %e, "Admin API task panicked"),
                Ok(Ok(())) => {}
            }
        }

        self.state.router.stop().await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all route: every request goes through the dispatcher.
async fn dispatch_handler(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    let Ok(_permit) = state.limit.acquire().await else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response();
    };

    tracing::debug!(
        client = %client,
        method = %request.method(),
        path = %request.uri().path(),
        "Dispatching request"
    );
    state.dispatcher.service(request).await
}

async fn apply_reloads(
    mut rx: mpsc::UnboundedReceiver<RouterConfig>,
    modules: Arc<Mutex<ModuleLoader>>,
    mut current: RouterConfig,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    loop {
        let next = tokio::select! {
            next = rx.recv() => match next {
                Some(next) => next,
                None => return,
            },
            _ = shutdown.recv() => return,
        };

        if next.dispatch != current.dispatch || next.listener != current.listener {
            tracing::warn!("Listener and dispatch settings take effect after a restart");
        }
        modules.lock().await.reconcile(&next.modules).await;
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_begin_shutdown_turns_away_queued_requests() {
        let router = Arc::new(Router::default());
        let state = AppState::new(Arc::clone(&router), &RouterConfig::default());

        state.begin_shutdown();
        assert!(state.limit.is_closed());
        assert!(router.is_shutdown_requested());

        let client: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = dispatch_handler(State(state), ConnectInfo(client), request).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
