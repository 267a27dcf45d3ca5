//! Error page generation.
//!
//! The dispatcher calls the configured renderer whenever it has to
//! synthesize a 404/500/503 body itself.

use axum::body::Bytes;
use axum::http::StatusCode;

/// Renders `(status, reason, description)` into a response body.
pub trait ErrorPageRenderer: Send + Sync {
    fn render(&self, status: StatusCode, reason: &str, description: &str) -> Bytes;

    fn content_type(&self) -> &'static str {
        "text/html; charset=utf-8"
    }
}

impl<F> ErrorPageRenderer for F
where
    F: Fn(StatusCode, &str, &str) -> Bytes + Send + Sync,
{
    fn render(&self, status: StatusCode, reason: &str, description: &str) -> Bytes {
        self(status, reason, description)
    }
}

/// Default HTML error page.
#[derive(Debug, Clone)]
pub struct HtmlErrorPage {
    server_name: String,
}

impl HtmlErrorPage {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
        }
    }
}

impl Default for HtmlErrorPage {
    fn default() -> Self {
        Self::new("hotswap-router")
    }
}

impl ErrorPageRenderer for HtmlErrorPage {
    fn render(&self, status: StatusCode, reason: &str, description: &str) -> Bytes {
        let page = format!(
            "<html><head><title>Error {code} {reason}</title></head>\n\
             <body><h2>HTTP ERROR {code}</h2>\n\
             <p>Problem accessing {description}. Reason:</p>\n\
             <pre>    {reason}</pre>\n\
             <hr><i><small>{server}</small></i></body></html>\n",
            code = status.as_u16(),
            reason = escape_html(reason),
            description = escape_html(description),
            server = escape_html(&self.server_name),
        );
        Bytes::from(page)
    }
}

/// Canonical reason phrase for a status code.
pub fn reason_phrase(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown")
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
