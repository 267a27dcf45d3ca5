//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, body limit)
//!     → request.rs (wrap as RouterRequest, decode path)
//!     → [routing layer resolves alias, runs filters + handler]
//!     → response.rs (status, headers, buffered body)
//!     → error_page.rs (generated body for 404/500/503 and send_error)
//!     → Send to client
//! ```

pub mod error_page;
pub mod request;
pub mod response;
pub mod server;

pub use error_page::{ErrorPageRenderer, HtmlErrorPage};
pub use request::{MappingData, RouterRequest, X_REQUEST_ID};
pub use response::{ErrorRequest, RouterResponse};
pub use server::{AppState, HttpServer};
