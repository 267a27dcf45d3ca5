//! Filter subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (under structural lock):
//!     filter + pattern → PathSpec (global / prefix / exact)
//!     → registry.rs (idempotent insert, new snapshot)
//!
//! Per request:
//!     request path → registry.rs (global, then prefixes longest-first,
//!                                 then exact; priority sort)
//!     → chain.rs (cursor walks filters, then the handler)
//! ```

pub mod builtin;
pub mod chain;
pub mod registry;

pub use chain::{FaultSource, FilterChain};
pub use registry::{FilterEntry, FilterIndex, FilterInfo, FilterPriority, FilterRegistry, PathSpec};
