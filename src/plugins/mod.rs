//! Plugin system for PlugHost
//!
//! Plugins are directories under one of the configured plugin roots. Each
//! carries a `manifest.conf` and optionally a shared object with native code,
//! the name of an external HTTP helper, web content and a javascript module.
//!
//! # Architecture
//!
//! - **types**: Core data structures (`PluginManifest`, `PluginDescriptor`, `PluginRecord`)
//! - **manifest**: `manifest.conf` parsing and validation
//! - **scanner**: Plugin discovery across root directories
//! - **abi**: The C entry points and the version negotiation record
//! - **native**: Opening shared objects behind the `ModuleLoader` capability
//! - **registry**: Active plugins in activation order
//! - **tracker**: The scan / activate / finalize / shutdown lifecycle
//! - **introspection**: `GET /plugins/all_plugins.json`
//!
//! # Plugin Directory Structure
//!
//! ```text
//! /usr/local/lib/plughost/plugins/
//! ├── alpha/
//! │   ├── manifest.conf
//! │   ├── libalpha.so
//! │   └── httpd/
//! │       ├── index.html
//! │       └── js/alpha.js
//! └── beta/
//!     └── manifest.conf        # httpexternal=beta_helper
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use plughost::config::PluginsConfig;
//! use plughost::host::{HostContext, HostVersion};
//! use plughost::plugins::PluginTracker;
//!
//! # async fn run() -> plughost::error::Result<()> {
//! let host = Arc::new(HostContext::new(HostVersion::current()));
//! let tracker = PluginTracker::create(&host, PluginsConfig::default());
//!
//! tracker.scan_plugins()?;
//! tracker.activate_plugins()?;
//! tracker.finalize_plugins()?;
//! println!("{} plugins active", tracker.plugin_count());
//! tracker.shutdown_plugins().await?;
//! # Ok(())
//! # }
//! ```

pub mod abi;
pub mod introspection;
pub mod manifest;
pub mod native;
pub mod registry;
pub mod scanner;
pub mod tracker;
pub mod types;

pub use abi::{PluginServerInfo, PLUGIN_API_VERSION};
pub use introspection::{PluginIntrospection, INTROSPECTION_PATH};
pub use manifest::{load_manifest, parse_manifest, validate_manifest, MANIFEST_FILE};
pub use native::{DylibLoader, ModuleLoader, NativeModule};
pub use registry::PluginRegistry;
pub use scanner::{scan_directory, scan_plugins};
pub use tracker::{LifecycleState, PluginTracker, PLUGIN_TRACKER_COMPONENT};
pub use types::{PluginDescriptor, PluginKind, PluginManifest, PluginRecord};
