//! Static resource handler.
//!
//! Serves `prefix + path_info` out of a [`ResourceContext`]. Concurrent
//! requests for the same resource share one read: the first request starts
//! the load, later ones await the same shared future.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header::{HeaderValue, ALLOW, CONTENT_LENGTH};
use axum::http::{Method, StatusCode};
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::error::{ServiceError, ServiceResult};
use crate::handler::Handler;
use crate::http::{RouterRequest, RouterResponse};

/// A loaded resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub bytes: Bytes,
    pub content_type: &'static str,
}

impl Resource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let name = name.into();
        let content_type = content_type_for(&name);
        Self {
            name,
            bytes: bytes.into(),
            content_type,
        }
    }
}

/// Where a module's resources come from.
#[async_trait]
pub trait ResourceContext: Send + Sync {
    /// Load `name` (always starting with `/`). `Ok(None)` when it does not
    /// exist or may not be served.
    async fn open(&self, name: &str) -> io::Result<Option<Resource>>;

    /// Short description for logs and the admin API.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Resources read from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryContext {
    root: PathBuf,
}

impl DirectoryContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a resource name onto the root, refusing anything that leaves it.
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name.trim_start_matches('/'));
        let mut path = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        Some(path)
    }
}

#[async_trait]
impl ResourceContext for DirectoryContext {
    async fn open(&self, name: &str) -> io::Result<Option<Resource>> {
        let Some(path) = self.resolve(name) else {
            tracing::warn!(resource = %name, root = ?self.root, "Rejected resource path outside root");
            return Ok(None);
        };

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        }

        let bytes = tokio::fs::read(&path).await?;
        Ok(Some(Resource::new(name, bytes)))
    }

    fn describe(&self) -> String {
        format!("dir:{}", self.root.display())
    }
}

type SharedLoad = Shared<BoxFuture<'static, Result<Option<Resource>, String>>>;

/// Handler serving resources below a name prefix.
pub struct ResourceHandler {
    prefix: String,
    context: Arc<dyn ResourceContext>,
    inflight: DashMap<String, (u64, SharedLoad)>,
    next_load: AtomicU64,
}

impl ResourceHandler {
    pub fn new(prefix: impl Into<String>, context: Arc<dyn ResourceContext>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
            context,
            inflight: DashMap::new(),
            next_load: AtomicU64::new(0),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Loads currently shared between requests.
    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    /// Load `name`, joining a load already in progress for the same name.
    pub async fn load(&self, name: &str) -> Result<Option<Resource>, String> {
        // The entry guard must be gone before awaiting
        let (id, load) = match self.inflight.entry(name.to_string()) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(e) => {
                let id = self.next_load.fetch_add(1, Ordering::Relaxed);
                let context = Arc::clone(&self.context);
                let key = name.to_string();
                let load = async move { context.open(&key).await.map_err(|e| e.to_string()) }
                    .boxed()
                    .shared();
                e.insert((id, load.clone()));
                (id, load)
            }
        };

        let result = load.await;
        self.inflight.remove_if(name, |_, (current, _)| *current == id);
        result
    }
}

#[async_trait]
impl Handler for ResourceHandler {
    async fn service(&self, req: &mut RouterRequest, resp: &mut RouterResponse) -> ServiceResult {
        let head = req.method() == Method::HEAD;
        if req.method() != Method::GET && !head {
            resp.set_header(ALLOW, HeaderValue::from_static("GET, HEAD"));
            resp.send_error(StatusCode::METHOD_NOT_ALLOWED, None);
            return Ok(());
        }

        let name = format!("{}{}", self.prefix, req.path_info().unwrap_or(""));
        if name.is_empty() {
            resp.send_error(StatusCode::NOT_FOUND, None);
            return Ok(());
        }

        match self.load(&name).await.map_err(ServiceError::fault)? {
            Some(resource) => {
                resp.set_content_type(resource.content_type);
                resp.set_header(CONTENT_LENGTH, HeaderValue::from(resource.bytes.len()));
                if !head {
                    resp.write(&resource.bytes);
                }
            }
            None => {
                tracing::debug!(resource = %name, context = %self.context.describe(), "Resource not found");
                resp.send_error(StatusCode::NOT_FOUND, None);
            }
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "resource"
    }
}

/// Content type guessed from a resource name's extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
