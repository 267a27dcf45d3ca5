//! Per-request filter chain.
//!
//! A cursor walks the ordered filter list; each filter receives the chain
//! and calls `proceed` to hand over to the next one. Once the list is
//! exhausted the terminal handler services the request.

use futures_util::future::BoxFuture;

use crate::error::ServiceResult;
use crate::handler::{SharedFilter, SharedHandler};
use crate::http::{RouterRequest, RouterResponse};

/// Which stage raised a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultSource {
    Filter,
    Handler,
}

impl FaultSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultSource::Filter => "filter",
            FaultSource::Handler => "handler",
        }
    }
}

/// Ordered filters plus the terminal handler for one request.
pub struct FilterChain {
    filters: Vec<SharedFilter>,
    pos: usize,
    handler: SharedHandler,
    in_handler: bool,
    handler_failed: bool,
}

impl FilterChain {
    pub fn new(filters: Vec<SharedFilter>, handler: SharedHandler) -> Self {
        Self {
            filters,
            pos: 0,
            handler,
            in_handler: false,
            handler_failed: false,
        }
    }

    /// Invoke the next filter, or the handler once every filter has run.
    pub fn proceed<'a>(
        &'a mut self,
        req: &'a mut RouterRequest,
        resp: &'a mut RouterResponse,
    ) -> BoxFuture<'a, ServiceResult> {
        Box::pin(async move {
            if self.pos < self.filters.len() {
                let filter = self.filters[self.pos].clone();
                self.pos += 1;
                return filter.do_filter(req, resp, self).await;
            }

            let handler = self.handler.clone();
            self.in_handler = true;
            let result = handler.service(req, resp).await;
            self.in_handler = false;
            if result.is_err() {
                self.handler_failed = true;
            }
            result
        })
    }

    /// Attribute a fault observed by the caller to a filter or the handler.
    ///
    /// A panic unwinding out of `service` leaves `in_handler` set.
    pub fn fault_source(&self) -> FaultSource {
        if self.in_handler || self.handler_failed {
            FaultSource::Handler
        } else {
            FaultSource::Filter
        }
    }

    /// Number of filters in the chain.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Index of the next filter to run.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Filter names in invocation order.
    pub fn filter_names(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.name().to_string()).collect()
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.filter_names())
            .field("pos", &self.pos)
            .field("handler", &self.handler.kind())
            .finish()
    }
}
