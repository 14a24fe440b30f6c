//! Helper binary search paths
//!
//! Search paths are templates:
//!
//! - `%B` is the directory holding the host executable
//! - `%h` and a leading `~` are the user's home directory
//!
//! An empty template list falls back to `%B` alone.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::security::join_in_dir;

/// Used when no helper search paths are configured.
pub const DEFAULT_HELPER_PATH: &str = "%B";

/// Directory of the running host executable.
pub fn host_binary_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Expand one template. `None` when it needs a directory that is unknown.
pub fn expand_template(
    template: &str,
    binary_dir: Option<&Path>,
    home: Option<&Path>,
) -> Option<PathBuf> {
    let mut expanded = template.to_string();

    if expanded == "~" || expanded.starts_with("~/") {
        let home = home?.to_string_lossy();
        expanded = format!("{}{}", home, &expanded[1..]);
    }

    if expanded.contains("%h") {
        expanded = expanded.replace("%h", &home?.to_string_lossy());
    }

    if expanded.contains("%B") {
        expanded = expanded.replace("%B", &binary_dir?.to_string_lossy());
    }

    Some(PathBuf::from(expanded))
}

/// Expand `templates` in order, substituting the `%B` fallback when the
/// list is empty. Templates that cannot be expanded are skipped.
pub fn search_dirs(templates: &[String]) -> Vec<PathBuf> {
    let fallback = [DEFAULT_HELPER_PATH.to_string()];
    let templates = if templates.is_empty() {
        warn!(
            fallback = DEFAULT_HELPER_PATH,
            "No helper binary search paths configured, using the host binary directory"
        );
        &fallback[..]
    } else {
        templates
    };

    let binary_dir = host_binary_dir();
    let home = dirs::home_dir();

    templates
        .iter()
        .filter_map(|t| {
            let dir = expand_template(t, binary_dir.as_deref(), home.as_deref());
            if dir.is_none() {
                warn!(template = %t, "Cannot expand helper search path, skipping");
            }
            dir
        })
        .collect()
}

/// First directory in `dirs` holding an executable regular file `binary`.
///
/// `binary` must already be validated as a bare filename.
pub fn find_in_dirs(binary: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    for dir in dirs {
        let Ok(candidate) = join_in_dir(dir, binary, "helper binary") else {
            continue;
        };
        if is_executable_file(candidate.as_path()) {
            debug!(path = %candidate.as_path().display(), "Resolved helper binary");
            return Some(candidate.into_path_buf());
        }
    }
    None
}

/// Resolve `binary` against the search path templates.
pub fn resolve_helper_binary(binary: &str, templates: &[String]) -> Option<PathBuf> {
    find_in_dirs(binary, &search_dirs(templates))
}

fn is_executable_file(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
