//! Handler and filter contracts.
//!
//! # Data Flow
//! ```text
//! Module registers handler/filter
//!     → init(params) runs once, before the registration becomes visible
//!     → service()/do_filter() run concurrently for each request
//!     → destroy() runs once, after the last in-flight request finished
//! ```
//!
//! # Design Decisions
//! - Both contracts are object-safe async traits shared behind `Arc`
//! - Kinds of handlers (business logic, resource serving) are variants
//!   behind the one `Handler` trait, chosen at registration time
//! - Filter identity for idempotent-add is its class name

pub mod resource;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServiceResult;
use crate::filter::chain::FilterChain;
use crate::http::{RouterRequest, RouterResponse};

pub use resource::{DirectoryContext, Resource, ResourceContext, ResourceHandler};

/// String key/value initialization parameters supplied at registration time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitParams {
    params: HashMap<String, String>,
    resource_context: Option<String>,
}

impl InitParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(params: HashMap<String, String>) -> Self {
        Self {
            params,
            resource_context: None,
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Name of the resource context the registration was bound to.
    pub fn resource_context(&self) -> Option<&str> {
        self.resource_context.as_deref()
    }

    pub(crate) fn set_resource_context(&mut self, name: impl Into<String>) {
        self.resource_context = Some(name.into());
    }
}

/// A request handler registered under an alias.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Called once before the handler becomes reachable.
    fn init(&self, _params: &InitParams) -> ServiceResult {
        Ok(())
    }

    /// Service one request.
    ///
    /// A 404 from a handler below `/` hands the same request to the parent
    /// alias. Handlers that may answer 404 should read the body through
    /// [`RouterRequest::body_bytes`] so the parent still sees it.
    async fn service(&self, req: &mut RouterRequest, resp: &mut RouterResponse) -> ServiceResult;

    /// Called once after the handler was removed and drained.
    fn destroy(&self) {}

    /// Human-readable kind, used in logs and the admin API.
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A cross-cutting filter wrapped around handler invocations.
#[async_trait]
pub trait Filter: Send + Sync {
    fn init(&self, _params: &InitParams) -> ServiceResult {
        Ok(())
    }

    /// Inspect or modify the exchange, then either call `chain.proceed` or
    /// answer directly.
    async fn do_filter(
        &self,
        req: &mut RouterRequest,
        resp: &mut RouterResponse,
        chain: &mut FilterChain,
    ) -> ServiceResult;

    fn destroy(&self) {}

    /// Class name, used for idempotent registration and priority ordering.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

pub type SharedHandler = Arc<dyn Handler>;
pub type SharedFilter = Arc<dyn Filter>;

/// True when both handles point at the same filter instance.
pub fn same_filter(a: &SharedFilter, b: &SharedFilter) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
