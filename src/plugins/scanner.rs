//! Plugin discovery for PlugHost
//!
//! Walks the configured root directories and builds a preliminary descriptor
//! for every immediate subdirectory that carries a `manifest.conf`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{HostError, Result};

use super::manifest::{load_manifest, MANIFEST_FILE};
use super::types::PluginDescriptor;

/// Discover plugins across multiple root directories.
///
/// Roots are scanned in the order given (system-wide before per-user), and
/// the subdirectories of each root in name order, so the returned preload
/// list is in a deterministic discovery order. A root that does not exist is
/// skipped. A plugin whose manifest fails to parse is logged and skipped
/// without affecting the others.
///
/// # Example
///
/// ```no_run
/// use std::path::PathBuf;
/// use plughost::plugins::scan_plugins;
///
/// let roots = vec![PathBuf::from("/usr/local/lib/plughost/plugins")];
/// for plugin in scan_plugins(&roots) {
///     println!("Found plugin: {} v{}", plugin.name(), plugin.version());
/// }
/// ```
pub fn scan_plugins(roots: &[PathBuf]) -> Vec<PluginDescriptor> {
    let mut preload = Vec::new();

    for root in roots {
        if !root.exists() {
            info!(dir = %root.display(), "Plugin directory does not exist, skipping");
            continue;
        }

        if !root.is_dir() {
            warn!(path = %root.display(), "Plugin path is not a directory, skipping");
            continue;
        }

        let subdirs = match list_subdirectories(root) {
            Ok(subdirs) => subdirs,
            Err(e) => {
                warn!(dir = %root.display(), error = %e, "Failed to read plugin directory");
                continue;
            }
        };

        for dir in subdirs {
            match scan_directory(&dir) {
                Ok(Some(plugin)) => {
                    info!(
                        plugin = %plugin.name(),
                        version = %plugin.version(),
                        dir = %dir.display(),
                        "Discovered plugin"
                    );
                    preload.push(plugin);
                }
                Ok(None) => {
                    debug!(dir = %dir.display(), "No manifest, skipping");
                }
                Err(e) => {
                    warn!(
                        dir = %dir.display(),
                        error = %e,
                        "Failed to load plugin manifest, skipping"
                    );
                }
            }
        }
    }

    preload
}

/// Build a descriptor for one plugin directory.
///
/// Returns `Ok(None)` when the directory has no manifest, and an error when
/// the manifest exists but cannot be parsed or validated.
pub fn scan_directory(dir: &Path) -> Result<Option<PluginDescriptor>> {
    if !dir.join(MANIFEST_FILE).is_file() {
        return Ok(None);
    }

    let manifest = load_manifest(dir)?;
    Ok(Some(PluginDescriptor::new(manifest, dir.to_path_buf())))
}

fn list_subdirectories(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(root).map_err(|e| {
        HostError::Config(format!(
            "Failed to read plugin directory {}: {}",
            root.display(),
            e
        ))
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| HostError::Config(format!("Failed to read directory entry: {}", e)))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }

    dirs.sort();
    Ok(dirs)
}
