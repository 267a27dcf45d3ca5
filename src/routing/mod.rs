//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (any task, any time):
//!     Router::register / unregister
//!     → structural lock
//!     → table.rs (clone, mutate, publish new AliasTable snapshot)
//!     → slot.rs (drain in-flight requests, run destroy hook)
//!
//! Dispatch (per request):
//!     dispatcher.rs
//!     → table.rs snapshot lookup (exact, then alias.rs parent walk)
//!     → slot.rs read guard
//!     → filter chain + handler
//! ```
//!
//! # Design Decisions
//! - The table changes at run time; dispatch never takes the structural lock
//! - Prefix walk only, no regex or pattern aliases
//! - Deterministic: the same table always resolves a path the same way

pub mod alias;
pub mod dispatcher;
pub mod router;
pub mod slot;
pub mod table;

pub use alias::{parent_alias, path_info, validate_alias};
pub use dispatcher::Dispatcher;
pub use router::{AliasInfo, Router, RouterBuilder, SYSTEM_OWNER};
pub use slot::{HandlerSlot, SlotGuard, TeardownReason};
pub use table::{AliasTable, RegistrationTable, Structure};
