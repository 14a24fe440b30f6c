//! `GET /plugins/all_plugins.json`
//!
//! Lists every active plugin as a JSON array of [`PluginRecord`]s:
//!
//! ```json
//! [
//!   {
//!     "name": "alpha",
//!     "description": "Alpha plugin",
//!     "author": "Alpha Labs",
//!     "version": "1.0.0",
//!     "dirname": "alpha",
//!     "path": "/usr/local/lib/plughost/plugins/alpha",
//!     "shared_object": "libalpha.so",
//!     "jsmodule": "",
//!     "http_helper": ""
//!   }
//! ]
//! ```
//!
//! [`PluginRecord`]: super::types::PluginRecord

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::http::{HttpHandler, HttpRequest, HttpResponse};

use super::tracker::PluginTracker;

/// The only path the endpoint serves.
pub const INTROSPECTION_PATH: &str = "/plugins/all_plugins.json";

/// Read-only view of the plugin tracker for the host's HTTP server.
#[derive(Debug, Clone)]
pub struct PluginIntrospection {
    tracker: Arc<PluginTracker>,
}

impl PluginIntrospection {
    pub fn new(tracker: Arc<PluginTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl HttpHandler for PluginIntrospection {
    fn verify_path(&self, path: &str, method: &str) -> bool {
        path == INTROSPECTION_PATH && method == "GET"
    }

    async fn handle(&self, _request: &HttpRequest) -> Result<HttpResponse> {
        // Records are copied under the tracker lock and serialized after it
        // is released.
        let records = self.tracker.snapshot();
        HttpResponse::json(&records)
    }
}
