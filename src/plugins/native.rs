//! Native module loading
//!
//! Opening shared objects is the one place the host runs foreign code in its
//! own address space. It sits behind the [`ModuleLoader`] capability so the
//! host decides explicitly whether native extensions are loaded at all, and
//! so the lifecycle coordinator can be exercised without real libraries.
//!
//! A [`NativeModule`] is closed when it is dropped. Whoever owns the box owns
//! the library handle; there is no other way to close it, so a module is
//! closed exactly once.

use std::ffi::c_int;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use tracing::debug;

use crate::error::{HostError, Result};
use crate::host::HostContext;

use super::abi::{
    ActivationFn, PluginServerInfo, VersionCheckFn, ACTIVATE_SYMBOL, FINALIZE_SYMBOL,
    VERSION_CHECK_SYMBOL,
};

/// An opened native plugin module.
#[cfg_attr(test, mockall::automock)]
pub trait NativeModule: Send + Sync {
    /// Call the version-check entry point. `Err` when the symbol is missing.
    fn version_check(&self, info: &mut PluginServerInfo) -> Result<i32>;

    /// Call the activation entry point. `Err` when the symbol is missing.
    fn activate(&self, host: &HostContext) -> Result<i32>;

    /// Call the optional finalize entry point; `None` when the module does
    /// not export one.
    fn finalize(&self, host: &HostContext) -> Option<i32>;
}

/// Capability to open native modules.
pub trait ModuleLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn NativeModule>>;
}

/// Loader backed by the platform dynamic linker.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl ModuleLoader for DylibLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn NativeModule>> {
        // SAFETY: Loading a library runs its initialisers inside the host
        // process. Plugins are trusted at the same level as the host binary.
        let library = unsafe { Library::new(path) }
            .map_err(|e| HostError::Load(format!("Failed to open {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "Opened native module");

        Ok(Box::new(DylibModule {
            library,
            path: path.to_path_buf(),
        }))
    }
}

/// A shared object opened through `libloading`.
pub struct DylibModule {
    library: Library,
    path: PathBuf,
}

impl DylibModule {
    fn symbol<T>(&self, name: &str) -> Option<Symbol<'_, T>> {
        // SAFETY: the caller picks `T` to match the documented ABI of `name`.
        unsafe { self.library.get::<T>(name.as_bytes()).ok() }
    }

    fn missing(&self, name: &str) -> HostError {
        HostError::Load(format!("{} does not export '{}'", self.path.display(), name))
    }
}

impl NativeModule for DylibModule {
    fn version_check(&self, info: &mut PluginServerInfo) -> Result<i32> {
        let check = self
            .symbol::<VersionCheckFn>(VERSION_CHECK_SYMBOL)
            .ok_or_else(|| self.missing(VERSION_CHECK_SYMBOL))?;
        // SAFETY: `info` is a valid, exclusively borrowed repr(C) record.
        let ret: c_int = unsafe { check(info as *mut PluginServerInfo) };
        Ok(ret)
    }

    fn activate(&self, host: &HostContext) -> Result<i32> {
        let activate = self
            .symbol::<ActivationFn>(ACTIVATE_SYMBOL)
            .ok_or_else(|| self.missing(ACTIVATE_SYMBOL))?;
        // SAFETY: the handle stays valid for the duration of the call.
        let ret: c_int = unsafe { activate(host.as_handle()) };
        Ok(ret)
    }

    fn finalize(&self, host: &HostContext) -> Option<i32> {
        let finalize = self.symbol::<ActivationFn>(FINALIZE_SYMBOL)?;
        // SAFETY: as for `activate`.
        let ret: c_int = unsafe { finalize(host.as_handle()) };
        Some(ret)
    }
}

impl Drop for DylibModule {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "Closing native module");
    }
}

impl std::fmt::Debug for DylibModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DylibModule")
            .field("path", &self.path)
            .finish()
    }
}
