//! Hot-swappable HTTP alias router.
//!
//! Modules register request handlers under URL aliases (`/`, `/api`,
//! `/api/v1`) and filters on path patterns at runtime. The dispatcher maps
//! each request to the longest registered alias, runs the matching filter
//! chain and hands the request to the handler. Registrations can be
//! replaced or torn down while traffic is flowing; in-flight requests on a
//! slot finish before its handler is destroyed.

pub mod admin;
pub mod config;
pub mod error;
pub mod filter;
pub mod handler;
pub mod http;
pub mod lifecycle;
pub mod module;
pub mod observability;
pub mod routing;

pub use config::RouterConfig;
pub use error::{RegistrationError, ServiceError, ServiceResult};
pub use filter::{FilterChain, PathSpec};
pub use handler::{Filter, Handler, InitParams, SharedFilter, SharedHandler};
pub use http::{HttpServer, RouterRequest, RouterResponse};
pub use lifecycle::Shutdown;
pub use module::ModuleContext;
pub use routing::{Dispatcher, Router};
