//! Plugin types for PlugHost
//!
//! This module defines the descriptor the host keeps for every discovered
//! plugin package, the manifest it is built from, and the serializable record
//! exposed by the introspection endpoint.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::harness::ExternalHttpHarness;

use super::native::NativeModule;

/// Metadata read from a plugin's `manifest.conf`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin name. Unique among active plugins.
    pub name: String,

    /// Human-readable description.
    pub description: String,

    /// Author name or identifier.
    pub author: String,

    /// Free-form version string.
    pub version: String,

    /// Shared object filename inside the plugin directory, for plugins with
    /// native code.
    #[serde(default)]
    pub shared_object: Option<String>,

    /// External helper binary name, for plugins that serve HTTP through a
    /// separate process.
    #[serde(default)]
    pub http_helper: Option<String>,

    /// Javascript module filename shipped in the plugin's web content.
    #[serde(default)]
    pub js_module: Option<String>,
}

/// What a plugin needs from the host to come alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    /// Ships a shared object; activated through the native ABI.
    Native,
    /// No native code; served by an external helper process.
    HttpHelper,
    /// Web content only.
    ContentOnly,
}

/// One discovered plugin package and the resources it owns.
///
/// Metadata is fixed once scanning creates the descriptor. The native module
/// is attached during activation and the harness during finalize; both are
/// owned by exactly one descriptor at a time and move with it.
pub struct PluginDescriptor {
    manifest: PluginManifest,
    dirname: String,
    install_path: PathBuf,
    // Fields drop in declaration order: the harness goes before the module.
    harness: Option<ExternalHttpHarness>,
    module: Option<Box<dyn NativeModule>>,
}

impl PluginDescriptor {
    /// Create a descriptor for the plugin installed at `install_path`.
    pub fn new(manifest: PluginManifest, install_path: PathBuf) -> Self {
        let dirname = install_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            manifest,
            dirname,
            install_path,
            harness: None,
            module: None,
        }
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn description(&self) -> &str {
        &self.manifest.description
    }

    pub fn author(&self) -> &str {
        &self.manifest.author
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }

    pub fn shared_object(&self) -> Option<&str> {
        self.manifest.shared_object.as_deref()
    }

    pub fn http_helper(&self) -> Option<&str> {
        self.manifest.http_helper.as_deref()
    }

    pub fn js_module(&self) -> Option<&str> {
        self.manifest.js_module.as_deref()
    }

    /// Name of the plugin's directory under its scan root.
    pub fn dirname(&self) -> &str {
        &self.dirname
    }

    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    pub fn kind(&self) -> PluginKind {
        if self.manifest.shared_object.is_some() {
            PluginKind::Native
        } else if self.manifest.http_helper.is_some() {
            PluginKind::HttpHelper
        } else {
            PluginKind::ContentOnly
        }
    }

    /// URL prefix under which this plugin's web content is served.
    pub fn http_prefix(&self) -> String {
        format!("/plugin/{}/", self.dirname)
    }

    pub fn module(&self) -> Option<&dyn NativeModule> {
        self.module.as_deref()
    }

    pub fn has_module(&self) -> bool {
        self.module.is_some()
    }

    /// Attach the opened native module; ownership moves into the descriptor.
    pub fn set_module(&mut self, module: Box<dyn NativeModule>) {
        self.module = Some(module);
    }

    pub fn harness(&self) -> Option<&ExternalHttpHarness> {
        self.harness.as_ref()
    }

    pub fn set_harness(&mut self, harness: ExternalHttpHarness) {
        self.harness = Some(harness);
    }

    /// Release owned resources: the harness first (stop inbound, terminate
    /// the helper, free the channel), then the native module.
    pub async fn release(mut self) {
        if let Some(harness) = self.harness.take() {
            harness.shutdown().await;
        }
        drop(self.module.take());
    }

    /// Serializable view of this descriptor.
    pub fn record(&self) -> PluginRecord {
        PluginRecord {
            name: self.manifest.name.clone(),
            description: self.manifest.description.clone(),
            author: self.manifest.author.clone(),
            version: self.manifest.version.clone(),
            dirname: self.dirname.clone(),
            path: self.install_path.display().to_string(),
            shared_object: self.manifest.shared_object.clone().unwrap_or_default(),
            jsmodule: self.manifest.js_module.clone().unwrap_or_default(),
            http_helper: self.manifest.http_helper.clone().unwrap_or_default(),
        }
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.manifest.name)
            .field("version", &self.manifest.version)
            .field("install_path", &self.install_path)
            .field("kind", &self.kind())
            .field("module", &self.module.is_some())
            .field("harness", &self.harness.is_some())
            .finish()
    }
}

/// A descriptor as reported by the introspection endpoint.
///
/// Optional manifest fields are reported as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRecord {
    pub name: String,
    pub description: String,
    pub author: String,
    pub version: String,
    pub dirname: String,
    pub path: String,
    pub shared_object: String,
    pub jsmodule: String,
    pub http_helper: String,
}
