//! Configuration for PlugHost
//!
//! The host reads a single JSON file (`~/.plughost/config.json` by default).
//! A missing file yields the defaults; every field is optional.
//!
//! ```json
//! {
//!     "plugins": {
//!         "enabled": true,
//!         "plugin_dirs": ["/usr/local/lib/plughost/plugins", "~/.plughost/plugins"],
//!         "helper_binary_paths": ["%B", "/usr/local/libexec/plughost"],
//!         "allowed_plugins": [],
//!         "blocked_plugins": ["legacy-gps"]
//!     }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{HostError, Result};

/// Environment variable that replaces `plugins.plugin_dirs` (`:`-separated).
pub const PLUGIN_DIRS_ENV: &str = "PLUGHOST_PLUGIN_DIRS";

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Plugin subsystem settings.
    #[serde(default)]
    pub plugins: PluginsConfig,
}

/// Plugin subsystem configuration.
///
/// Controls whether plugins are loaded at all, which root directories are
/// scanned for plugin packages, where external helper binaries may be
/// launched from, and which plugins are allowed or blocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Whether the plugin system is enabled. Defaults to true.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Root directories to scan for plugin subdirectories, in scan order.
    /// Defaults to the system-wide directory followed by the per-user one.
    #[serde(default = "default_plugin_dirs")]
    pub plugin_dirs: Vec<String>,

    /// Ordered search-path templates for external helper binaries.
    ///
    /// Supports `%B` (directory of the host executable), `%h` and a leading
    /// `~` (home directory). Empty means "fall back to `%B`" with a warning.
    #[serde(default)]
    pub helper_binary_paths: Vec<String>,

    /// Allowlist of plugin names. If empty, all discovered plugins are allowed.
    #[serde(default)]
    pub allowed_plugins: Vec<String>,

    /// Blocklist of plugin names. Blocklist takes precedence over allowlist.
    #[serde(default)]
    pub blocked_plugins: Vec<String>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            plugin_dirs: default_plugin_dirs(),
            helper_binary_paths: Vec::new(),
            allowed_plugins: Vec::new(),
            blocked_plugins: Vec::new(),
        }
    }
}

impl PluginsConfig {
    /// Check whether a plugin name is permitted by the allow/block lists.
    ///
    /// A plugin is permitted if:
    /// - It is not in the blocked list, AND
    /// - The allowed list is empty (all plugins allowed) OR the plugin is in the allowed list.
    pub fn is_plugin_permitted(&self, name: &str) -> bool {
        if self.blocked_plugins.iter().any(|b| b == name) {
            return false;
        }
        if self.allowed_plugins.is_empty() {
            return true;
        }
        self.allowed_plugins.iter().any(|a| a == name)
    }

    /// Root directories with `~` expanded, in scan order.
    pub fn root_dirs(&self) -> Vec<PathBuf> {
        self.plugin_dirs.iter().map(|d| expand_home(d)).collect()
    }
}

fn default_enabled() -> bool {
    true
}

/// Returns the default plugin directories: system-wide, then per-user.
fn default_plugin_dirs() -> Vec<String> {
    vec![
        "/usr/local/lib/plughost/plugins".to_string(),
        "~/.plughost/plugins".to_string(),
    ]
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

impl Config {
    /// The per-user configuration directory (`~/.plughost`).
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".plughost")
    }

    /// Path of the default configuration file.
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load the default configuration file, applying environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    /// Load configuration from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                HostError::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_str::<Config>(&content).map_err(|e| {
                HostError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            info!(path = %path.display(), "No config file found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dirs) = std::env::var(PLUGIN_DIRS_ENV) {
            let dirs: Vec<String> = dirs
                .split(':')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect();
            if !dirs.is_empty() {
                self.plugins.plugin_dirs = dirs;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_plugins_config_defaults() {
        let config = PluginsConfig::default();
        assert!(config.enabled);
        assert_eq!(
            config.plugin_dirs,
            vec!["/usr/local/lib/plughost/plugins", "~/.plughost/plugins"]
        );
        assert!(config.helper_binary_paths.is_empty());
        assert!(config.allowed_plugins.is_empty());
        assert!(config.blocked_plugins.is_empty());
    }

    #[test]
    fn test_plugins_config_deserialization_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.plugins.enabled);
        assert_eq!(config.plugins.plugin_dirs.len(), 2);

        let config: Config = serde_json::from_str(r#"{"plugins": {}}"#).unwrap();
        assert!(config.plugins.enabled);
        assert!(config.plugins.helper_binary_paths.is_empty());
    }

    #[test]
    fn test_is_plugin_permitted_all_allowed() {
        let config = PluginsConfig::default();
        assert!(config.is_plugin_permitted("any-plugin"));
    }

    #[test]
    fn test_is_plugin_permitted_allowlist() {
        let config = PluginsConfig {
            allowed_plugins: vec!["good-plugin".to_string()],
            ..Default::default()
        };
        assert!(config.is_plugin_permitted("good-plugin"));
        assert!(!config.is_plugin_permitted("other-plugin"));
    }

    #[test]
    fn test_blocklist_overrides_allowlist() {
        let config = PluginsConfig {
            allowed_plugins: vec!["my-plugin".to_string()],
            blocked_plugins: vec!["my-plugin".to_string()],
            ..Default::default()
        };
        assert!(!config.is_plugin_permitted("my-plugin"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/opt/plugins"), PathBuf::from("/opt/plugins"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/.plughost/plugins"), home.join(".plughost/plugins"));
            assert_eq!(expand_home("~"), home);
        }
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_from(&tmp.path().join("absent.json")).unwrap();
        assert!(config.plugins.enabled);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(
            &path,
            r#"{"plugins": {"enabled": false, "helper_binary_paths": ["%B", "/opt/helpers"]}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(!config.plugins.enabled);
        assert_eq!(config.plugins.helper_binary_paths, vec!["%B", "/opt/helpers"]);
    }

    #[test]
    fn test_load_from_malformed_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, "{ broken").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, HostError::Config(_)));
    }
}
