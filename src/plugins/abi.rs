//! Native plugin ABI
//!
//! A native plugin is a shared object exporting up to three C-linkage entry
//! points:
//!
//! ```c
//! int plughost_plugin_version_check(struct plugin_server_info *);
//! int plughost_plugin_activate(const void *host);
//! int plughost_plugin_finalize(const void *host);   /* optional */
//! ```
//!
//! All three return negative on failure, non-negative on success. The
//! version check receives a zeroed [`PluginServerInfo`] whose
//! `plugin_api_version` is set to [`PLUGIN_API_VERSION`]; the plugin fills in
//! the fields defined for that API version and must not touch anything
//! beyond them. A plugin that does not understand the API version returns -1.
//!
//! `host` is an opaque pointer to the host's [`HostContext`]
//! (see [`crate::host::HostContext::as_handle`]).
//!
//! [`HostContext`]: crate::host::HostContext

use std::ffi::{c_char, c_int, c_uint, CStr};

use crate::host::{HostRegistryHandle, HostVersion};

/// Current plugin API version.
pub const PLUGIN_API_VERSION: c_uint = 1;

/// Symbol of the mandatory version-check entry point.
pub const VERSION_CHECK_SYMBOL: &str = "plughost_plugin_version_check";

/// Symbol of the mandatory activation entry point.
pub const ACTIVATE_SYMBOL: &str = "plughost_plugin_activate";

/// Symbol of the optional finalize entry point.
pub const FINALIZE_SYMBOL: &str = "plughost_plugin_finalize";

/// Size of each version string field, including the NUL terminator.
pub const VERSION_FIELD_LEN: usize = 32;

/// `int (*)(struct plugin_server_info *)`
pub type VersionCheckFn = unsafe extern "C" fn(*mut PluginServerInfo) -> c_int;

/// `int (*)(const void *host)` for both activate and finalize.
pub type ActivationFn = unsafe extern "C" fn(HostRegistryHandle) -> c_int;

/// Version negotiation payload (API version 1).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginServerInfo {
    // V1
    pub plugin_api_version: c_uint,
    pub host_major: [c_char; VERSION_FIELD_LEN],
    pub host_minor: [c_char; VERSION_FIELD_LEN],
    pub host_tiny: [c_char; VERSION_FIELD_LEN],
    // End V1
}

impl PluginServerInfo {
    /// A zeroed record carrying only the current API version.
    pub fn for_current_api() -> Self {
        Self {
            plugin_api_version: PLUGIN_API_VERSION,
            host_major: [0; VERSION_FIELD_LEN],
            host_minor: [0; VERSION_FIELD_LEN],
            host_tiny: [0; VERSION_FIELD_LEN],
        }
    }

    /// Fill the version triple; values longer than the field are truncated.
    pub fn set_host_version(&mut self, version: &HostVersion) {
        write_field(&mut self.host_major, &version.major);
        write_field(&mut self.host_minor, &version.minor);
        write_field(&mut self.host_tiny, &version.tiny);
    }

    /// The version triple as filled in by the plugin. `None` when the plugin
    /// left every field empty.
    pub fn host_version(&self) -> Option<HostVersion> {
        let major = read_field(&self.host_major);
        let minor = read_field(&self.host_minor);
        let tiny = read_field(&self.host_tiny);
        if major.is_empty() && minor.is_empty() && tiny.is_empty() {
            return None;
        }
        Some(HostVersion { major, minor, tiny })
    }
}

fn write_field(field: &mut [c_char; VERSION_FIELD_LEN], value: &str) {
    *field = [0; VERSION_FIELD_LEN];
    for (slot, byte) in field
        .iter_mut()
        .zip(value.bytes().take(VERSION_FIELD_LEN - 1))
    {
        *slot = byte as c_char;
    }
}

fn read_field(field: &[c_char; VERSION_FIELD_LEN]) -> String {
    // Force termination in case the plugin filled the whole field.
    let mut bytes = [0u8; VERSION_FIELD_LEN];
    for (dst, src) in bytes.iter_mut().zip(field.iter()).take(VERSION_FIELD_LEN - 1) {
        *dst = *src as u8;
    }
    CStr::from_bytes_until_nul(&bytes)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
