//! hotswap-router server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──▶ listener ──▶ tower-http layers ──▶ Dispatcher
//!                                                   │
//!                               alias lookup (longest prefix, walk up)
//!                                                   │
//!                                 filter chain ──▶ handler slot
//!
//!   config file ──▶ watcher ──▶ ModuleLoader (register / unregister)
//!   admin API   ──▶ status, aliases, filters, drain, unload
//! ```

use std::path::PathBuf;

use clap::Parser;
use hotswap_router::config::{load_config, RouterConfig};
use hotswap_router::lifecycle::startup;
use hotswap_router::observability::logging;

#[derive(Parser)]
#[command(name = "hotswap-router")]
#[command(about = "HTTP alias router with runtime handler registration", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Watched for changes while running.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };

    logging::init(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        "hotswap-router starting"
    );

    startup::run(config, args.config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
