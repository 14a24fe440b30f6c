//! Host context for PlugHost
//!
//! `HostContext` is the explicit service locator the host constructs once and
//! hands, by reference, to every loader and ABI call. Native plugins receive
//! it as an opaque pointer in their activate/finalize entry points; Rust code
//! reaches host services through it instead of through process-wide state.

use std::any::Any;
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

use crate::http::WebContentRegistry;

/// Host version triple reported during version negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostVersion {
    pub major: String,
    pub minor: String,
    pub tiny: String,
}

impl HostVersion {
    pub fn new(major: &str, minor: &str, tiny: &str) -> Self {
        Self {
            major: major.to_string(),
            minor: minor.to_string(),
            tiny: tiny.to_string(),
        }
    }

    /// The version of this crate, split on `.`.
    pub fn current() -> Self {
        let mut parts = env!("CARGO_PKG_VERSION").split('.');
        Self::new(
            parts.next().unwrap_or("0"),
            parts.next().unwrap_or("0"),
            parts.next().unwrap_or("0"),
        )
    }
}

impl std::fmt::Display for HostVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.tiny)
    }
}

/// Opaque pointer handed to native entry points.
pub type HostRegistryHandle = *const c_void;

type Component = Arc<dyn Any + Send + Sync>;

/// Service locator shared by the host and its plugins.
pub struct HostContext {
    version: HostVersion,
    web: WebContentRegistry,
    components: RwLock<HashMap<String, Component>>,
    fatal: AtomicBool,
}

impl HostContext {
    pub fn new(version: HostVersion) -> Self {
        Self {
            version,
            web: WebContentRegistry::new(),
            components: RwLock::new(HashMap::new()),
            fatal: AtomicBool::new(false),
        }
    }

    pub fn version(&self) -> &HostVersion {
        &self.version
    }

    /// Static content and javascript modules registered by plugins.
    pub fn web(&self) -> &WebContentRegistry {
        &self.web
    }

    /// Register a component under `name`, replacing any previous one.
    pub fn insert_component<T: Any + Send + Sync>(&self, name: &str, component: Arc<T>) {
        self.components
            .write()
            .insert(name.to_string(), component as Component);
    }

    /// Look up a component by name and concrete type.
    pub fn component<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let component = self.components.read().get(name).cloned()?;
        component.downcast::<T>().ok()
    }

    /// Remove a component, returning whether it was present.
    pub fn remove_component(&self, name: &str) -> bool {
        self.components.write().remove(name).is_some()
    }

    /// Flag a host-terminating condition. The host checks `is_fatal` after
    /// each lifecycle hook and exits when set.
    pub fn raise_fatal(&self, reason: &str) {
        error!(reason = %reason, "Fatal condition raised");
        self.fatal.store(true, Ordering::SeqCst);
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }

    /// The handle passed across the native ABI. Valid for as long as `self`.
    pub fn as_handle(&self) -> HostRegistryHandle {
        self as *const HostContext as *const c_void
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("version", &self.version)
            .field("components", &self.components.read().len())
            .field("fatal", &self.is_fatal())
            .finish()
    }
}
