//! Active plugin registry for PlugHost
//!
//! This module provides the `PluginRegistry` that holds the descriptors which
//! passed version negotiation and activation. Entries keep their activation
//! order, and plugin names are unique within the registry.

use tracing::info;

use crate::error::{HostError, Result};

use super::types::{PluginDescriptor, PluginRecord};

/// Ordered collection of activated plugins.
///
/// # Example
///
/// ```rust
/// use std::path::PathBuf;
/// use plughost::plugins::{PluginDescriptor, PluginManifest, PluginRegistry};
///
/// let mut registry = PluginRegistry::new();
///
/// let manifest = PluginManifest {
///     name: "example".to_string(),
///     description: "Example plugin".to_string(),
///     author: "Example Author".to_string(),
///     version: "1.0.0".to_string(),
///     ..Default::default()
/// };
///
/// registry
///     .register(PluginDescriptor::new(manifest, PathBuf::from("/tmp/example")))
///     .unwrap();
///
/// assert_eq!(registry.len(), 1);
/// assert!(registry.contains("example"));
/// ```
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<PluginDescriptor>,
}

impl PluginRegistry {
    /// Create a new empty plugin registry.
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Append an activated plugin.
    ///
    /// Fails, dropping the descriptor and anything it owns, when a plugin
    /// with the same name is already registered.
    pub fn register(&mut self, plugin: PluginDescriptor) -> Result<()> {
        if let Some(existing) = self.get(plugin.name()) {
            return Err(HostError::Conflict(format!(
                "Plugin '{}' from {} conflicts with already active plugin from {}",
                plugin.name(),
                plugin.install_path().display(),
                existing.install_path().display()
            )));
        }

        info!(
            plugin = %plugin.name(),
            version = %plugin.version(),
            native = plugin.has_module(),
            "Registered plugin"
        );

        self.plugins.push(plugin);
        Ok(())
    }

    /// Get a plugin by name.
    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Iterate in activation order.
    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.plugins.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PluginDescriptor> {
        self.plugins.iter_mut()
    }

    /// Serializable records of every registered plugin, in activation order.
    pub fn records(&self) -> Vec<PluginRecord> {
        self.plugins.iter().map(PluginDescriptor::record).collect()
    }

    /// Remove and return every plugin, leaving the registry empty.
    pub fn drain(&mut self) -> Vec<PluginDescriptor> {
        std::mem::take(&mut self.plugins)
    }
}
