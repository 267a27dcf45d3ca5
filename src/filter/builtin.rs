//! Built-in filters that configuration can attach by kind name.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use axum::http::header::{HeaderName, HeaderValue, AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::StatusCode;

use crate::error::{ServiceError, ServiceResult};
use crate::filter::chain::FilterChain;
use crate::handler::{Filter, InitParams, SharedFilter};
use crate::http::{RouterRequest, RouterResponse};

/// Kind names accepted in configuration.
pub const KNOWN_KINDS: &[&str] = &["access_log", "security_headers", "bearer_auth"];

/// Instantiate a built-in filter by kind name.
pub fn from_kind(kind: &str) -> Option<SharedFilter> {
    match kind {
        "access_log" => Some(Arc::new(AccessLogFilter)),
        "security_headers" => Some(Arc::new(SecurityHeadersFilter::default())),
        "bearer_auth" => Some(Arc::new(BearerAuthFilter::default())),
        _ => None,
    }
}

/// Logs one line per request with status and latency.
#[derive(Debug, Default)]
pub struct AccessLogFilter;

#[async_trait]
impl Filter for AccessLogFilter {
    async fn do_filter(
        &self,
        req: &mut RouterRequest,
        resp: &mut RouterResponse,
        chain: &mut FilterChain,
    ) -> ServiceResult {
        let start = Instant::now();
        let line = req.describe();
        let request_id = req.request_id().to_string();

        let result = chain.proceed(req, resp).await;

        tracing::info!(
            request_id = %request_id,
            request = %line,
            status = resp.status().as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "access"
        );
        result
    }

    fn name(&self) -> &str {
        "access_log"
    }
}

/// Adds hardening headers to every response passing through.
#[derive(Debug, Default)]
pub struct SecurityHeadersFilter {
    extra: RwLock<Vec<(HeaderName, HeaderValue)>>,
}

impl SecurityHeadersFilter {
    const DEFAULTS: [(&'static str, &'static str); 3] = [
        ("x-content-type-options", "nosniff"),
        ("x-frame-options", "DENY"),
        ("referrer-policy", "no-referrer"),
    ];
}

#[async_trait]
impl Filter for SecurityHeadersFilter {
    /// Every init parameter becomes an additional header.
    fn init(&self, params: &InitParams) -> ServiceResult {
        let mut extra = Vec::new();
        for (name, value) in params.iter() {
            let name = HeaderName::try_from(name)
                .map_err(|e| ServiceError::fault(format!("invalid header name `{}`: {}", name, e)))?;
            let value = HeaderValue::try_from(value)
                .map_err(|e| ServiceError::fault(format!("invalid header value: {}", e)))?;
            extra.push((name, value));
        }
        *self.extra.write().unwrap_or_else(|e| e.into_inner()) = extra;
        Ok(())
    }

    async fn do_filter(
        &self,
        req: &mut RouterRequest,
        resp: &mut RouterResponse,
        chain: &mut FilterChain,
    ) -> ServiceResult {
        chain.proceed(req, resp).await?;

        for (name, value) in Self::DEFAULTS {
            resp.headers_mut()
                .entry(name)
                .or_insert(HeaderValue::from_static(value));
        }
        let extra = self.extra.read().unwrap_or_else(|e| e.into_inner()).clone();
        for (name, value) in extra {
            resp.set_header(name, value);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "security_headers"
    }
}

/// Rejects requests without the configured bearer token.
#[derive(Debug, Default)]
pub struct BearerAuthFilter {
    token: RwLock<Option<String>>,
}

impl BearerAuthFilter {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl Filter for BearerAuthFilter {
    fn init(&self, params: &InitParams) -> ServiceResult {
        if let Some(token) = params.get("token") {
            *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token.to_string());
        }
        if self.token.read().unwrap_or_else(|e| e.into_inner()).is_none() {
            return Err(ServiceError::fault("bearer_auth requires a `token` parameter"));
        }
        Ok(())
    }

    async fn do_filter(
        &self,
        req: &mut RouterRequest,
        resp: &mut RouterResponse,
        chain: &mut FilterChain,
    ) -> ServiceResult {
        let expected = self.token.read().unwrap_or_else(|e| e.into_inner()).clone();
        let authorized = match expected.as_deref() {
            Some(expected) => req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .is_some_and(|presented| presented == expected),
            None => false,
        };

        if authorized {
            return chain.proceed(req, resp).await;
        }

        tracing::warn!(request = %req.describe(), "Rejected request without valid bearer token");
        resp.set_header(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        resp.send_error(StatusCode::UNAUTHORIZED, None);
        Ok(())
    }

    fn name(&self) -> &str {
        "bearer_auth"
    }
}
