//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hotswap_router::config::RouterConfig;
use hotswap_router::http::{HttpServer, RouterRequest, RouterResponse};
use hotswap_router::lifecycle::Shutdown;
use hotswap_router::routing::Router;
use hotswap_router::{Filter, FilterChain, Handler, ServiceResult};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const ADMIN_KEY: &str = "test-admin-key";

/// A router served on ephemeral ports.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub router: Arc<Router>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn admin_url(&self, path: &str) -> String {
        format!("http://{}{}", self.admin_addr, path)
    }

    /// Trigger shutdown and wait for the server task to finish.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

/// Start an `HttpServer` for `config` with the admin API enabled.
pub async fn spawn_server(mut config: RouterConfig) -> TestServer {
    config.listener.bind_address = "127.0.0.1:0".into();
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.into();

    let router = Arc::new(Router::from_config(&config));
    let server = HttpServer::new(config, Arc::clone(&router));
    let failures = server.load_modules().await;
    assert!(failures.is_empty(), "module load failed: {:?}", failures);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let admin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let admin_addr = admin_listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        server
            .run(listener, Some(admin_listener), None, &server_shutdown)
            .await
    });

    TestServer {
        addr,
        admin_addr,
        router,
        shutdown,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Writes a fixed body.
#[allow(dead_code)]
pub struct Text(pub &'static str);

#[async_trait]
impl Handler for Text {
    async fn service(&self, _req: &mut RouterRequest, resp: &mut RouterResponse) -> ServiceResult {
        resp.write(self.0);
        Ok(())
    }
}

/// Appends its name to a shared trace, then proceeds.
#[allow(dead_code)]
pub struct Recording {
    pub name: &'static str,
    pub trace: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl Recording {
    pub fn new(name: &'static str, trace: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            trace: Arc::clone(trace),
        })
    }
}

#[async_trait]
impl Filter for Recording {
    async fn do_filter(
        &self,
        req: &mut RouterRequest,
        resp: &mut RouterResponse,
        chain: &mut FilterChain,
    ) -> ServiceResult {
        self.trace.lock().unwrap().push(self.name.to_string());
        chain.proceed(req, resp).await
    }

    fn name(&self) -> &str {
        self.name
    }
}
