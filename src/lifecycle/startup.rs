//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize metrics, the router and configured modules in order
//! - Bind listeners and begin accepting traffic
//! - Start the config watcher and signal handler
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, including a module that does
//!   not register cleanly
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::watcher::ConfigWatcher;
use crate::config::RouterConfig;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_handler;
use crate::module::ModuleError;
use crate::observability::metrics;
use crate::routing::Router;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("config watcher: {0}")]
    Watch(#[from] notify::Error),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bring the router up and serve until a shutdown signal arrives.
///
/// With `config_path` set, changes to that file are applied to the
/// configured modules while running.
pub async fn run(config: RouterConfig, config_path: Option<PathBuf>) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let router = Arc::new(Router::from_config(&config));
    let server = HttpServer::new(config.clone(), router);

    let mut failures = server.load_modules().await;
    if !failures.is_empty() {
        for failure in &failures {
            tracing::error!(error = %failure, "Startup aborted");
        }
        return Err(failures.remove(0).into());
    }

    let listener = bind(&config.listener.bind_address).await?;
    let admin_listener = if config.admin.enabled {
        Some(bind(&config.admin.bind_address).await?)
    } else {
        None
    };

    let (watcher, updates) = match config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(&path, config.clone());
            (Some(watcher.run()?), Some(updates))
        }
        None => (None, None),
    };

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        modules = config.modules.len(),
        "Router ready"
    );

    server.run(listener, admin_listener, updates, &shutdown).await?;
    drop(watcher);
    Ok(())
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}
