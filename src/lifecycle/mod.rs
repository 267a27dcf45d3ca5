//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Router → configured modules → listeners → watcher + signals
//!
//! Shutdown (shutdown.rs):
//!     Signal received → flag set (new requests get 503) → drain connections
//!     → Router::stop (every alias and filter destroyed) → Exit
//!
//! Operator drain (shutdown.rs, via admin API):
//!     flag set / cleared without stopping the process
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Ordered shutdown: refuse new work, drain, destroy

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownFlag};
