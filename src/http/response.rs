//! Response handling and transformation.
//!
//! # Responsibilities
//! - Collect status, headers and body written by filters and handlers
//! - Record `send_error` requests so the dispatcher can render an error page
//! - Convert into the transport's response type
//!
//! # Design Decisions
//! - Body is buffered; handlers write chunks with `write`
//! - `reset` clears everything so a fallback attempt starts clean

use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, Response, StatusCode};
use bytes::BytesMut;

/// A pending error the dispatcher must render into a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRequest {
    pub status: StatusCode,
    pub description: Option<String>,
}

/// Response being assembled for one request.
#[derive(Debug)]
pub struct RouterResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    error: Option<ErrorRequest>,
}

impl Default for RouterResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterResponse {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            error: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Set the content type from a static string.
    pub fn set_content_type(&mut self, content_type: &'static str) {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }

    /// Append bytes to the body.
    pub fn write(&mut self, chunk: impl AsRef<[u8]>) {
        self.body.extend_from_slice(chunk.as_ref());
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Ask the dispatcher to answer with a generated error page.
    pub fn send_error(&mut self, status: StatusCode, description: Option<String>) {
        self.status = status;
        self.body.clear();
        self.error = Some(ErrorRequest {
            status,
            description,
        });
    }

    pub fn error(&self) -> Option<&ErrorRequest> {
        self.error.as_ref()
    }

    pub(crate) fn take_error(&mut self) -> Option<ErrorRequest> {
        self.error.take()
    }

    /// Clear status, headers and body.
    pub fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
        self.error = None;
    }

    /// Convert into a transport response.
    pub fn into_http(self) -> Response<Body> {
        let mut headers = self.headers;
        if !headers.contains_key(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        }
        let mut response = Response::new(Body::from(self.body.freeze()));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}
