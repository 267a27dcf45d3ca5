//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Router, dispatcher, modules:
//!     → logging.rs (tracing subscriber: pretty or JSON, EnvFilter)
//!     → metrics.rs (request counts and latency per alias, registration
//!       counters, registered-alias gauge, fault counters)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint, when enabled
//! ```
//!
//! # Design Decisions
//! - Every dispatch fault is logged with path, query, request ID and the
//!   worker thread that serviced it
//! - Metric label sets stay bounded: alias, status, fault source, operation

pub mod logging;
pub mod metrics;
