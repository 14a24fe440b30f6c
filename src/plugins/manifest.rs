//! `manifest.conf` reader
//!
//! A manifest is a flat `key=value` file:
//!
//! ```text
//! # Alpha dot11 decoder
//! name=alpha
//! description=Decodes vendor IEs
//! author=Alpha Labs
//! version=1.0.0
//! object=libalpha.so
//! js=alpha.js
//! ```
//!
//! `httpexternal=<binary>` names an external helper for plugins without
//! native code.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{HostError, Result};
use crate::security::validate_bare_filename;

use super::types::PluginManifest;

/// Manifest filename inside every plugin directory.
pub const MANIFEST_FILE: &str = "manifest.conf";

/// Parse `key=value` lines. Blank lines and `#` comments are skipped; a
/// repeated key overrides the earlier value.
pub fn parse_key_values(content: &str) -> Result<HashMap<String, String>> {
    let mut values = HashMap::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| {
            HostError::Manifest(format!("line {}: expected key=value, got '{}'", idx + 1, line))
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(HostError::Manifest(format!("line {}: empty key", idx + 1)));
        }

        values.insert(key.to_string(), value.trim().to_string());
    }

    Ok(values)
}

/// Build a validated manifest from manifest text.
pub fn parse_manifest(content: &str) -> Result<PluginManifest> {
    let mut values = parse_key_values(content)?;

    let mut required = |key: &str| -> Result<String> {
        values
            .remove(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| HostError::Manifest(format!("missing '{}='", key)))
    };

    let name = required("name")?;
    let description = required("description")?;
    let author = required("author")?;
    let version = required("version")?;

    let mut optional = |key: &str| values.remove(key).filter(|v| !v.is_empty());

    let manifest = PluginManifest {
        name,
        description,
        author,
        version,
        shared_object: optional("object"),
        http_helper: optional("httpexternal"),
        js_module: optional("js"),
    };

    validate_manifest(&manifest)?;
    Ok(manifest)
}

/// Read and parse `<dir>/manifest.conf`.
pub fn load_manifest(dir: &Path) -> Result<PluginManifest> {
    let path = dir.join(MANIFEST_FILE);
    let content = fs::read_to_string(&path).map_err(|e| {
        HostError::Manifest(format!("Failed to read {}: {}", path.display(), e))
    })?;
    parse_manifest(&content)
}

/// Validate a plugin manifest for correctness and safety.
///
/// - Plugin name must be 1-64 characters: alphanumerics, `-` and `_`,
///   starting with an alphanumeric
/// - Shared object and javascript module must be bare filenames
///
/// The helper binary name is checked when its harness is constructed, where a
/// violation is fatal to the host rather than to the plugin.
pub fn validate_manifest(manifest: &PluginManifest) -> Result<()> {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    let name_re = NAME_RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_\-]{0,63}$").expect("static regex is valid")
    });

    if !name_re.is_match(&manifest.name) {
        return Err(HostError::Manifest(format!(
            "Invalid plugin name '{}': must be 1-64 alphanumeric characters, hyphens or underscores, starting with alphanumeric",
            manifest.name
        )));
    }

    if let Some(object) = &manifest.shared_object {
        validate_bare_filename(object, "shared object")?;
    }

    if let Some(js) = &manifest.js_module {
        validate_bare_filename(js, "javascript module")?;
    }

    Ok(())
}
