//! Filename validation for plugin-supplied names
//!
//! Plugin manifests name files (shared objects, javascript modules, helper
//! binaries) that the host later opens or executes. Those names must be bare
//! filenames: anything that could steer the host outside the plugin package
//! or the configured helper directories is rejected here.

use std::path::{Component, Path, PathBuf};

use crate::error::{HostError, Result};

/// A path that is guaranteed to be a bare filename joined onto a directory.
///
/// This struct can only be created through `join_in_dir`, so any `SafePath`
/// names a direct child of the directory it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafePath {
    path: PathBuf,
}

impl SafePath {
    /// Returns a reference to the underlying path.
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Converts the SafePath into a PathBuf.
    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }
}

impl AsRef<Path> for SafePath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Validates that `name` is a bare filename.
///
/// Rejects empty names, names containing `/` or `\`, and names carrying
/// traversal patterns (plain or URL-encoded `..`).
///
/// # Examples
///
/// ```
/// use plughost::security::validate_bare_filename;
///
/// assert!(validate_bare_filename("libdot11.so", "shared object").is_ok());
/// assert!(validate_bare_filename("../libevil.so", "shared object").is_err());
/// ```
pub fn validate_bare_filename(name: &str, what: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(HostError::SecurityViolation(format!("Empty {} name", what)));
    }

    if has_path_separator(name) {
        return Err(HostError::SecurityViolation(format!(
            "Invalid {} '{}': must not contain a path",
            what, name
        )));
    }

    if contains_traversal_pattern(name) {
        return Err(HostError::SecurityViolation(format!(
            "Invalid {} '{}': contains a traversal pattern",
            what, name
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(HostError::SecurityViolation(format!(
            "Invalid {} '{}': not a plain filename",
            what, name
        ))),
    }
}

/// Checks the name of an external helper binary for a path separator.
///
/// A helper binary is only ever looked up inside the configured search
/// directories, so a name with a `/` or `\` is a security violation. Other
/// malformed names (empty, encoded traversal) pass here and are rejected by
/// [`validate_bare_filename`] when the binary is resolved.
pub fn validate_binary_name(name: &str) -> Result<()> {
    if has_path_separator(name) {
        return Err(HostError::SecurityViolation(format!(
            "Invalid helper binary '{}': must not contain a path",
            name
        )));
    }
    Ok(())
}

fn has_path_separator(name: &str) -> bool {
    name.contains('/') || name.contains('\\')
}

/// Join a validated bare filename onto `dir`.
pub fn join_in_dir(dir: &Path, name: &str, what: &str) -> Result<SafePath> {
    validate_bare_filename(name, what)?;
    let path = dir.join(name);

    // A bare filename can only add a single normal component.
    if path.parent() != Some(dir) {
        return Err(HostError::SecurityViolation(format!(
            "{} '{}' escapes {}",
            what,
            name,
            dir.display()
        )));
    }

    Ok(SafePath { path })
}

/// Checks if a name contains common traversal patterns.
fn contains_traversal_pattern(name: &str) -> bool {
    let patterns = [
        "..",         // Parent directory
        "%2e%2e",     // URL encoded ..
        "%252e%252e", // Double URL encoded ..
        "%2f",        // Encoded separator
        "%5c",        // Encoded backslash
    ];

    let lower = name.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}
