//! Minimal HTTP model shared by the introspection endpoint and the external
//! helper harness.
//!
//! The host's real HTTP server owns sockets and routing; it hands each
//! request to a handler through [`dispatch`], which enforces the
//! verify-before-handle contract and maps handler errors to status codes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{HostError, Result};

/// An inbound HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new("GET", path)
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }
}

/// An HTTP response produced by a handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// `200 OK` with a JSON body.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        let mut response = Self::new(200, body);
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        Ok(response)
    }

    pub fn not_found() -> Self {
        Self::new(404, "Not Found")
    }

    pub fn service_unavailable() -> Self {
        Self::new(503, "Service Unavailable")
    }

    pub fn internal_error() -> Self {
        Self::new(500, "Internal Server Error")
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// A handler mounted on the host's HTTP server.
#[async_trait]
pub trait HttpHandler: Send + Sync {
    /// Whether this handler serves `(path, method)`. Called before any
    /// request processing; `false` means the request is rejected.
    fn verify_path(&self, path: &str, method: &str) -> bool;

    /// Produce a response for a request that passed `verify_path`.
    async fn handle(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Run `request` through `handler` the way the host's HTTP layer does.
///
/// Unverified requests get `404` without reaching `handle`. A handler whose
/// helper process is gone gets `503`; any other error is a `500`.
pub async fn dispatch(handler: &dyn HttpHandler, request: &HttpRequest) -> HttpResponse {
    if !handler.verify_path(&request.path, &request.method) {
        debug!(path = %request.path, method = %request.method, "Rejected request");
        return HttpResponse::not_found();
    }

    match handler.handle(request).await {
        Ok(response) => response,
        Err(HostError::HelperUnavailable(name)) => {
            debug!(plugin = %name, path = %request.path, "Helper unavailable");
            HttpResponse::service_unavailable()
        }
        Err(e) => {
            warn!(path = %request.path, error = %e, "Handler failed");
            HttpResponse::internal_error()
        }
    }
}

/// Javascript module registered by a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsModule {
    pub plugin: String,
    pub uri: String,
}

/// Static content directories and javascript modules contributed by plugins.
#[derive(Debug, Default)]
pub struct WebContentRegistry {
    static_dirs: RwLock<Vec<(String, PathBuf)>>,
    js_modules: RwLock<Vec<JsModule>>,
}

impl WebContentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve files under `dir` at URL `prefix`. Re-registering a prefix
    /// replaces the directory.
    pub fn register_static_dir(&self, prefix: &str, dir: &Path) {
        let mut dirs = self.static_dirs.write();
        dirs.retain(|(p, _)| p != prefix);
        dirs.push((prefix.to_string(), dir.to_path_buf()));
    }

    pub fn register_js_module(&self, plugin: &str, uri: &str) {
        let mut modules = self.js_modules.write();
        modules.retain(|m| m.plugin != plugin);
        modules.push(JsModule {
            plugin: plugin.to_string(),
            uri: uri.to_string(),
        });
    }

    /// Map a request path onto a file inside a registered static directory.
    /// Paths containing `..` never resolve.
    pub fn resolve_static(&self, path: &str) -> Option<PathBuf> {
        if path.split('/').any(|segment| segment == "..") {
            return None;
        }
        let dirs = self.static_dirs.read();
        dirs.iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(prefix, dir)| dir.join(&path[prefix.len()..]))
    }

    pub fn static_prefixes(&self) -> Vec<String> {
        self.static_dirs.read().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn js_modules(&self) -> Vec<JsModule> {
        self.js_modules.read().clone()
    }
}
