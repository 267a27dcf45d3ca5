//! Request handling and transformation.
//!
//! # Responsibilities
//! - Wrap the transport's already-parsed request for handlers and filters
//! - Expose the decoded path, query string, headers and body
//! - Carry the mapping data the dispatcher fills in (alias, path info)
//! - Carry the request ID assigned by the request-id layer
//!
//! # Design Decisions
//! - The path is percent-decoded once, when the request enters the router
//! - Body is taken at most once; filters that inspect it must put it back
//! - Mapping data is reset on every dispatch attempt (fallback may re-map)

use axum::body::{Body, Bytes};
use axum::http::{Extensions, HeaderMap, Method, Request, Uri, Version};
use uuid::Uuid;

use crate::error::ServiceResult;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Routing information filled in by the dispatcher for the matched alias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingData {
    /// The alias the request was dispatched to.
    pub alias: String,
    /// Remainder of the request path below the alias, always starting with `/`.
    pub path_info: Option<String>,
    /// Context path; always empty for handlers mounted on the root router.
    pub context_path: String,
}

/// An inbound request as seen by filters and handlers.
#[derive(Debug)]
pub struct RouterRequest {
    method: Method,
    uri: Uri,
    version: Version,
    path: String,
    headers: HeaderMap,
    extensions: Extensions,
    body: Option<Body>,
    mapping: MappingData,
    request_id: String,
}

impl RouterRequest {
    /// Build a request with an empty body. Mostly useful for tests and
    /// internal sub-requests.
    pub fn new(method: Method, uri: Uri) -> Self {
        let path = decode_path(uri.path());
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            path,
            headers: HeaderMap::new(),
            extensions: Extensions::new(),
            body: Some(Body::empty()),
            mapping: MappingData::default(),
            request_id: String::new(),
        }
    }

    /// Convenience constructor for a GET request.
    ///
    /// Falls back to `/` when `uri` does not parse.
    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri.parse().unwrap_or_else(|_| Uri::from_static("/")))
    }

    /// Wrap a transport request.
    ///
    /// Requests that reach the router without an `x-request-id` header get
    /// a fresh UUID v4.
    pub fn from_http(request: Request<Body>) -> Self {
        let (parts, body) = request.into_parts();
        let request_id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            path: decode_path(parts.uri.path()),
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            extensions: parts.extensions,
            body: Some(body),
            mapping: MappingData::default(),
            request_id,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Percent-decoded request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Typed per-request values attached by filters.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn set_request_id(&mut self, id: impl Into<String>) {
        self.request_id = id.into();
    }

    /// Mapping data for the alias currently servicing this request.
    pub fn mapping(&self) -> &MappingData {
        &self.mapping
    }

    /// Shortcut for `mapping().path_info`.
    pub fn path_info(&self) -> Option<&str> {
        self.mapping.path_info.as_deref()
    }

    pub(crate) fn set_mapping(&mut self, mapping: MappingData) {
        self.mapping = mapping;
    }

    /// Take the body stream. Returns `None` once taken.
    ///
    /// A taken body is gone for any parent alias the dispatcher falls back
    /// to; use [`body_bytes`](Self::body_bytes) when that matters.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// Put a (possibly re-buffered) body back for downstream consumers.
    pub fn set_body(&mut self, body: Body) {
        self.body = Some(body);
    }

    /// Collect the body into memory, up to `limit` bytes.
    ///
    /// The collected bytes are put back as the new body so later stages can
    /// read it again.
    pub async fn body_bytes(&mut self, limit: usize) -> ServiceResult<Bytes> {
        let body = self.body.take().unwrap_or_else(Body::empty);
        let bytes = axum::body::to_bytes(body, limit).await?;
        self.body = Some(Body::from(bytes.clone()));
        Ok(bytes)
    }

    /// URI and query string rendered for log lines.
    pub fn describe(&self) -> String {
        match self.query() {
            Some(q) => format!("{} {}?{}", self.method, self.path, q),
            None => format!("{} {}", self.method, self.path),
        }
    }
}

/// Percent-decode a request path.
///
/// Broken escapes are kept literally; a non-UTF-8 result leaves the raw path
/// untouched.
pub fn decode_path(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}
