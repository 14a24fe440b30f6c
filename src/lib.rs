//! PlugHost - Plugin subsystem for long-running monitoring hosts
//!
//! Discovers plugin packages on disk, loads and version-negotiates native
//! modules, bridges code-less plugins to the HTTP server through external
//! helper processes, and reports the active set over HTTP.

pub mod config;
pub mod error;
pub mod harness;
pub mod host;
pub mod http;
pub mod plugins;
pub mod security;

pub use config::Config;
pub use error::{HostError, Result};
pub use host::{HostContext, HostVersion};
pub use plugins::{PluginIntrospection, PluginTracker};
