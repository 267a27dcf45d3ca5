//! Request dispatch.
//!
//! # Responsibilities
//! - Resolve the request path to a registered alias (exact, then fallback)
//! - Hold the slot read lock while the filter chain and handler run
//! - Map faults and panics to 500, honor the shutdown flag with 503
//! - Render pending `send_error` requests through the error page renderer
//!
//! # Data Flow
//! ```text
//! Request<Body>
//!     → shutdown flag set?          → 503
//!     → exact lookup(path)          → miss: walk parents ("/a/b" → "/a" → "/")
//!     → slot.acquire()              → destroyed meanwhile: keep walking
//!     → FilterChain(filters for path) → handler.service
//!     → handler answered 404 below "/"? → reset, keep walking
//!     → render error page if requested → Response<Body>
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::header::{HeaderValue, CONTENT_TYPE};
use axum::http::{Request, Response, StatusCode};
use futures_util::FutureExt;

use crate::config::schema::DispatchMode;
use crate::filter::{FaultSource, FilterChain};
use crate::http::error_page::reason_phrase;
use crate::http::request::MappingData;
use crate::http::{RouterRequest, RouterResponse};
use crate::observability::metrics;
use crate::routing::alias::{parent_alias, path_info};
use crate::routing::router::Router;
use crate::routing::slot::HandlerSlot;

/// Outcome of servicing one candidate alias.
enum Attempt {
    /// The slot was destroyed between lookup and lock acquisition.
    Gone,
    Serviced(StatusCode),
    Fault {
        source: FaultSource,
        message: String,
    },
}

/// Entry point for inbound requests.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
}

impl Dispatcher {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Service a transport request end to end.
    pub async fn service(&self, request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let mut req = RouterRequest::from_http(request);
        let mut resp = RouterResponse::new();

        let alias = self.dispatch(&mut req, &mut resp).await;
        metrics::record_request(resp.status().as_u16(), alias.as_deref().unwrap_or("none"), start);

        resp.into_http()
    }

    /// Dispatch `req` into `resp`. Returns the alias that produced the
    /// response, or `None` for 404/503 generated by the dispatcher itself.
    pub async fn dispatch(&self, req: &mut RouterRequest, resp: &mut RouterResponse) -> Option<String> {
        if self.router.is_shutdown_requested() {
            resp.send_error(StatusCode::SERVICE_UNAVAILABLE, None);
            self.render_error(req, resp);
            return None;
        }

        let matched = self.resolve_and_run(req, resp).await;
        if matched.is_none() && resp.error().is_none() {
            resp.reset();
            resp.send_error(StatusCode::NOT_FOUND, None);
        }
        self.render_error(req, resp);
        matched
    }

    async fn resolve_and_run(&self, req: &mut RouterRequest, resp: &mut RouterResponse) -> Option<String> {
        let original = req.path().to_string();
        let single_level = self.router.mode() == DispatchMode::SingleLevel;

        let mut alias = original.clone();
        let mut cutoff = false;
        let mut rounds = 0usize;

        loop {
            let slot = if !cutoff {
                match self.router.lookup(&alias) {
                    Some(slot) => slot,
                    None => {
                        cutoff = true;
                        alias = original.clone();
                        continue;
                    }
                }
            } else {
                if single_level && rounds >= 1 {
                    return None;
                }
                rounds += 1;

                alias = parent_alias(&alias)?;
                match self.router.lookup(&alias) {
                    Some(slot) => slot,
                    None if alias == "/" => return None,
                    None => continue,
                }
            };

            match self.attempt(&slot, &original, req, resp).await {
                Attempt::Gone => {
                    tracing::debug!(alias = %alias, "Alias removed during dispatch, continuing fallback");
                    if !cutoff {
                        cutoff = true;
                        alias = original.clone();
                    }
                }
                Attempt::Serviced(status) if status == StatusCode::NOT_FOUND && slot.alias() != "/" => {
                    tracing::debug!(alias = %alias, path = %original, "Handler answered 404, continuing fallback");
                    resp.reset();
                    if !cutoff {
                        cutoff = true;
                        alias = original.clone();
                    }
                }
                Attempt::Serviced(_) => return Some(slot.alias().to_string()),
                Attempt::Fault { source, message } => {
                    tracing::error!(
                        path = %original,
                        query = req.query().unwrap_or_default(),
                        request_id = %req.request_id(),
                        worker = ?std::thread::current().id(),
                        alias = %slot.alias(),
                        source = source.as_str(),
                        error = %message,
                        "Request failed"
                    );
                    metrics::record_fault(source.as_str());
                    resp.reset();
                    resp.send_error(StatusCode::INTERNAL_SERVER_ERROR, None);
                    return Some(slot.alias().to_string());
                }
            }
        }
    }

    /// Run the filter chain and handler for one slot.
    ///
    /// The read guard is dropped on every exit path, panics included.
    async fn attempt(
        &self,
        slot: &Arc<HandlerSlot>,
        original: &str,
        req: &mut RouterRequest,
        resp: &mut RouterResponse,
    ) -> Attempt {
        let Some(guard) = slot.acquire().await else {
            return Attempt::Gone;
        };

        req.set_mapping(MappingData {
            alias: guard.alias().to_string(),
            path_info: path_info(original, guard.alias()),
            context_path: String::new(),
        });

        let filters = self.router.build_chain_for(original);
        let mut chain = FilterChain::new(filters, guard.handler().clone());
        let outcome = AssertUnwindSafe(chain.proceed(req, resp)).catch_unwind().await;
        drop(guard);

        match outcome {
            Ok(Ok(())) => Attempt::Serviced(resp.status()),
            Ok(Err(e)) => Attempt::Fault {
                source: chain.fault_source(),
                message: e.to_string(),
            },
            Err(panic) => Attempt::Fault {
                source: chain.fault_source(),
                message: format!("panic: {}", panic_message(panic.as_ref())),
            },
        }
    }

    fn render_error(&self, req: &RouterRequest, resp: &mut RouterResponse) {
        let Some(error) = resp.take_error() else {
            return;
        };

        let renderer = self.router.error_pages();
        let description = error.description.unwrap_or_else(|| req.path().to_string());
        let body = renderer.render(error.status, reason_phrase(error.status), &description);

        resp.set_status(error.status);
        resp.set_header(CONTENT_TYPE, HeaderValue::from_static(renderer.content_type()));
        resp.write(body);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("router", &self.router).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ServiceError, ServiceResult};
    use crate::routing::slot::TeardownReason;
    use crate::filter::PathSpec;
    use crate::handler::{Filter, Handler, InitParams};
    use async_trait::async_trait;
    use axum::body::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the matched alias and path info.
    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn service(&self, req: &mut RouterRequest, resp: &mut RouterResponse) -> ServiceResult {
            let info = req.path_info().unwrap_or("-");
            resp.write(format!("{}|{}", req.mapping().alias, info));
            Ok(())
        }
    }

    struct Status(StatusCode);

    #[async_trait]
    impl Handler for Status {
        async fn service(&self, _req: &mut RouterRequest, resp: &mut RouterResponse) -> ServiceResult {
            resp.set_status(self.0);
            resp.write("from handler");
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Handler for Failing {
        async fn service(&self, _req: &mut RouterRequest, _resp: &mut RouterResponse) -> ServiceResult {
            Err(ServiceError::fault("boom"))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Handler for Panicking {
        async fn service(&self, _req: &mut RouterRequest, _resp: &mut RouterResponse) -> ServiceResult {
            panic!("handler panicked");
        }
    }

    #[derive(Default)]
    struct CountingFilter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Filter for CountingFilter {
        async fn do_filter(
            &self,
            req: &mut RouterRequest,
            resp: &mut RouterResponse,
            chain: &mut FilterChain,
        ) -> ServiceResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            chain.proceed(req, resp).await
        }
    }

    fn router() -> Arc<Router> {
        Arc::new(Router::default())
    }

    fn register(router: &Router, alias: &str, handler: impl Handler + 'static) {
        router
            .register(alias, Arc::new(handler), &InitParams::new(), "test")
            .unwrap();
    }

    async fn get(router: &Arc<Router>, uri: &str) -> (Option<String>, RouterResponse) {
        let mut req = RouterRequest::get(uri);
        let mut resp = RouterResponse::new();
        let matched = router.dispatcher().dispatch(&mut req, &mut resp).await;
        (matched, resp)
    }

    fn text(resp: &RouterResponse) -> String {
        String::from_utf8_lossy(resp.body()).into_owned()
    }

    #[tokio::test]
    async fn test_exact_match_wins_over_parent() {
        let router = router();
        register(&router, "/a", Echo);
        register(&router, "/a/b", Echo);

        let (matched, resp) = get(&router, "/a/b").await;
        assert_eq!(matched.as_deref(), Some("/a/b"));
        assert_eq!(text(&resp), "/a/b|-");
    }

    #[tokio::test]
    async fn test_fallback_sets_path_info() {
        let router = router();
        register(&router, "/files", Echo);

        let (matched, resp) = get(&router, "/files/42/name").await;
        assert_eq!(matched.as_deref(), Some("/files"));
        assert_eq!(text(&resp), "/files|/42/name");
    }

    #[tokio::test]
    async fn test_root_catches_everything() {
        let router = router();
        register(&router, "/", Echo);

        let (matched, resp) = get(&router, "/x/y").await;
        assert_eq!(matched.as_deref(), Some("/"));
        assert_eq!(text(&resp), "/|/x/y");
    }

    #[tokio::test]
    async fn test_no_match_is_404_with_error_page() {
        let router = router();
        register(&router, "/other", Echo);

        let (matched, resp) = get(&router, "/missing/deep").await;
        assert!(matched.is_none());
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(text(&resp).contains("HTTP ERROR 404"));
        assert!(text(&resp).contains("/missing/deep"));
    }

    #[tokio::test]
    async fn test_handler_404_falls_back_to_parent() {
        let router = router();
        register(&router, "/a", Echo);
        register(&router, "/a/b", Status(StatusCode::NOT_FOUND));

        let (matched, resp) = get(&router, "/a/b/c").await;
        assert_eq!(matched.as_deref(), Some("/a"));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(text(&resp), "/a|/b/c");
    }

    /// Counts calls; answers 404 after reading the body.
    #[derive(Default)]
    struct Counted {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Handler for Counted {
        async fn service(&self, req: &mut RouterRequest, resp: &mut RouterResponse) -> ServiceResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            req.body_bytes(1024).await?;
            resp.set_status(StatusCode::NOT_FOUND);
            Ok(())
        }
    }

    /// Writes the request body back.
    struct EchoBody;

    #[async_trait]
    impl Handler for EchoBody {
        async fn service(&self, req: &mut RouterRequest, resp: &mut RouterResponse) -> ServiceResult {
            let body = req.body_bytes(1024).await?;
            resp.write(body);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_destroyed_slot_is_skipped_for_parent() {
        let router = router();
        register(&router, "/a", Echo);
        let stale = Arc::new(Counted::default());
        router
            .register("/a/b", stale.clone(), &InitParams::new(), "test")
            .unwrap();

        // Destroyed but still published: the lookup finds it, acquire refuses it.
        let slot = router.lookup("/a/b").unwrap();
        assert!(slot.destroy(TeardownReason::Unregistered).await);

        let (matched, resp) = get(&router, "/a/b/x").await;
        assert_eq!(matched.as_deref(), Some("/a"));
        assert_eq!(text(&resp), "/a|/b/x");
        assert_eq!(stale.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_destroyed_slot_without_parent_is_404() {
        let router = router();
        let stale = Arc::new(Counted::default());
        router
            .register("/solo", stale.clone(), &InitParams::new(), "test")
            .unwrap();
        let slot = router.lookup("/solo").unwrap();
        slot.destroy(TeardownReason::Stopped).await;

        let (matched, resp) = get(&router, "/solo").await;
        assert!(matched.is_none());
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(stale.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_buffered_body_survives_fallback() {
        let router = router();
        register(&router, "/a", EchoBody);
        register(&router, "/a/b", Counted::default());

        let mut req = RouterRequest::new(axum::http::Method::POST, "/a/b/c".parse().unwrap());
        req.set_body(axum::body::Body::from("payload"));
        let mut resp = RouterResponse::new();
        let matched = router.dispatcher().dispatch(&mut req, &mut resp).await;

        assert_eq!(matched.as_deref(), Some("/a"));
        assert_eq!(text(&resp), "payload");
    }

    #[tokio::test]
    async fn test_root_404_is_final() {
        let router = router();
        register(&router, "/", Status(StatusCode::NOT_FOUND));

        let (matched, resp) = get(&router, "/nothing").await;
        assert_eq!(matched.as_deref(), Some("/"));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(text(&resp), "from handler");
    }

    #[tokio::test]
    async fn test_other_statuses_pass_through() {
        let router = router();
        register(&router, "/a", Echo);
        register(&router, "/a/b", Status(StatusCode::FORBIDDEN));

        let (matched, resp) = get(&router, "/a/b").await;
        assert_eq!(matched.as_deref(), Some("/a/b"));
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_single_level_mode_walks_one_parent() {
        let router = Arc::new(Router::builder().mode(DispatchMode::SingleLevel).build());
        register(&router, "/a", Echo);

        let (matched, _) = get(&router, "/a/b").await;
        assert_eq!(matched.as_deref(), Some("/a"));

        let (matched, resp) = get(&router, "/a/b/c").await;
        assert!(matched.is_none());
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_shutdown_short_circuits() {
        let router = router();
        let filter = Arc::new(CountingFilter::default());
        register(&router, "/", Echo);
        router
            .register_filter(filter.clone(), PathSpec::Global, &InitParams::new(), "test")
            .unwrap();

        router.mark_shutdown_requested();
        let (matched, resp) = get(&router, "/a").await;
        assert!(matched.is_none());
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(filter.calls.load(Ordering::SeqCst), 0);

        router.unmark_shutdown_requested();
        let (_, resp) = get(&router, "/a").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(filter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fault_maps_to_500_and_releases_lock() {
        let router = router();
        register(&router, "/boom", Failing);

        let (_, resp) = get(&router, "/boom").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(text(&resp).contains("HTTP ERROR 500"));

        let slot = router.lookup("/boom").unwrap();
        assert_eq!(slot.in_flight(), 0);
        router.unregister("/boom", "test").await.unwrap();
    }

    #[tokio::test]
    async fn test_panic_maps_to_500_and_releases_lock() {
        let router = router();
        register(&router, "/panic", Panicking);

        let (_, resp) = get(&router, "/panic").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(router.lookup("/panic").unwrap().in_flight(), 0);

        tokio::time::timeout(std::time::Duration::from_secs(1), router.unregister("/panic", "test"))
            .await
            .expect("write lock must be available")
            .unwrap();
    }

    #[tokio::test]
    async fn test_custom_error_page_renderer() {
        let renderer = |status: StatusCode, reason: &str, description: &str| {
            Bytes::from(format!("{} {} {}", status.as_u16(), reason, description))
        };
        let router = Arc::new(Router::builder().error_pages(Arc::new(renderer)).build());

        let (_, resp) = get(&router, "/nope").await;
        assert_eq!(text(&resp), "404 Not Found /nope");
    }

    #[tokio::test]
    async fn test_service_converts_transport_types() {
        let router = router();
        register(&router, "/files", Echo);

        let request = Request::builder()
            .uri("/files/a%20b?x=1")
            .body(Body::empty())
            .unwrap();
        let response = router.dispatcher().service(request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"/files|/a b");
    }
}
