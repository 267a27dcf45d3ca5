//! Registrants.
//!
//! # Data Flow
//! ```text
//! Code module:    ModuleContext::new(router, id) → register_handler / register_filter
//! Config module:  ModuleConfig → loader.rs → ModuleContext (mounts, filters)
//! Config reload:  loader.rs reconcile → unregister_all_owned_by(id) → register again
//! ```

pub mod context;
pub mod loader;

pub use context::ModuleContext;
pub use loader::{ModuleError, ModuleLoader, ReloadReport};
