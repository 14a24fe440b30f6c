//! Plugin lifecycle coordinator
//!
//! The host drives every plugin through four hooks, called once each and in
//! this order:
//!
//! | hook                 | from           | to        |
//! |----------------------|----------------|-----------|
//! | `scan_plugins`       | Uninitialized  | Scanned   |
//! | `activate_plugins`   | Scanned        | Activated |
//! | `finalize_plugins`   | Activated      | Finalized |
//! | `shutdown_plugins`   | any but Shutdown | Shutdown |
//!
//! A hook called out of order fails with `HostError::Lifecycle` and changes
//! nothing.
//!
//! All tracker state sits behind one reentrant lock so that a plugin
//! callback running on the hook's thread can still read the tracker (for
//! example through the introspection snapshot).

use std::cell::{RefCell, RefMut};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, error, info, warn};

use crate::config::PluginsConfig;
use crate::error::{HostError, Result};
use crate::harness::{ExternalHttpHarness, HelperClient};
use crate::host::HostContext;
use crate::http::HttpHandler;
use crate::security::join_in_dir;

use super::abi::{PluginServerInfo, PLUGIN_API_VERSION};
use super::native::{DylibLoader, ModuleLoader};
use super::registry::PluginRegistry;
use super::scanner;
use super::types::{PluginDescriptor, PluginRecord};

/// Name under which the tracker registers itself with the host.
pub const PLUGIN_TRACKER_COMPONENT: &str = "plugin_tracker";

/// Where the tracker is in the plugin lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Scanned,
    Activated,
    Finalized,
    Shutdown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Scanned => "scanned",
            LifecycleState::Activated => "activated",
            LifecycleState::Finalized => "finalized",
            LifecycleState::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

struct TrackerState {
    state: LifecycleState,
    preload: Vec<PluginDescriptor>,
    registry: PluginRegistry,
}

type StateGuard<'a> = ReentrantMutexGuard<'a, RefCell<TrackerState>>;

/// Owns every plugin from discovery to shutdown.
pub struct PluginTracker {
    host: Weak<HostContext>,
    config: PluginsConfig,
    loader: Box<dyn ModuleLoader>,
    inner: ReentrantMutex<RefCell<TrackerState>>,
}

impl PluginTracker {
    /// Create a tracker that loads native modules with the platform dynamic
    /// linker, and register it with `host` as [`PLUGIN_TRACKER_COMPONENT`].
    pub fn create(host: &Arc<HostContext>, config: PluginsConfig) -> Arc<Self> {
        Self::with_loader(host, config, Box::new(DylibLoader))
    }

    /// Like [`PluginTracker::create`] with an explicit module loader.
    pub fn with_loader(
        host: &Arc<HostContext>,
        config: PluginsConfig,
        loader: Box<dyn ModuleLoader>,
    ) -> Arc<Self> {
        let tracker = Arc::new(Self {
            host: Arc::downgrade(host),
            config,
            loader,
            inner: ReentrantMutex::new(RefCell::new(TrackerState {
                state: LifecycleState::Uninitialized,
                preload: Vec::new(),
                registry: PluginRegistry::new(),
            })),
        });
        host.insert_component(PLUGIN_TRACKER_COMPONENT, tracker.clone());
        tracker
    }

    fn host(&self) -> Result<Arc<HostContext>> {
        self.host
            .upgrade()
            .ok_or_else(|| HostError::Lifecycle("host context has been dropped".to_string()))
    }

    /// Mutable access for a hook; fails instead of panicking when a plugin
    /// callback re-enters a mutating hook.
    fn state_mut<'a>(guard: &'a StateGuard<'_>) -> Result<RefMut<'a, TrackerState>> {
        guard.try_borrow_mut().map_err(|_| {
            HostError::Lifecycle("lifecycle hook re-entered from a plugin callback".to_string())
        })
    }

    /// Move to `to` if currently in `from`.
    fn advance(
        state: &mut TrackerState,
        from: LifecycleState,
        to: LifecycleState,
        hook: &str,
    ) -> Result<()> {
        if state.state != from {
            return Err(HostError::Lifecycle(format!(
                "{} called while {}, expected {}",
                hook, state.state, from
            )));
        }
        state.state = to;
        Ok(())
    }

    pub fn state(&self) -> LifecycleState {
        let guard = self.inner.lock();
        let state = guard.borrow().state;
        state
    }

    /// Discover plugin packages under the configured roots.
    ///
    /// Returns the number of plugins found.
    pub fn scan_plugins(&self) -> Result<usize> {
        let guard = self.inner.lock();
        let mut state = Self::state_mut(&guard)?;
        Self::advance(
            &mut state,
            LifecycleState::Uninitialized,
            LifecycleState::Scanned,
            "scan_plugins",
        )?;

        state.preload = if self.config.enabled {
            scanner::scan_plugins(&self.config.root_dirs())
        } else {
            info!("Plugin system disabled, not scanning");
            Vec::new()
        };

        let count = state.preload.len();
        info!(count, "Plugin scan complete");
        Ok(count)
    }

    /// Load, negotiate and activate every scanned plugin.
    ///
    /// Failures are per plugin: the plugin is logged and dropped (closing any
    /// module it opened) and the rest carry on. Returns the number of active
    /// plugins.
    pub fn activate_plugins(&self) -> Result<usize> {
        let host = self.host()?;
        let guard = self.inner.lock();
        let preload = {
            let mut state = Self::state_mut(&guard)?;
            Self::advance(
                &mut state,
                LifecycleState::Scanned,
                LifecycleState::Activated,
                "activate_plugins",
            )?;
            std::mem::take(&mut state.preload)
        };

        for mut plugin in preload {
            if !self.config.is_plugin_permitted(plugin.name()) {
                info!(plugin = %plugin.name(), "Plugin not permitted by configuration, skipping");
                continue;
            }

            if let Some(active) = guard.borrow().registry.get(plugin.name()) {
                warn!(
                    plugin = %plugin.name(),
                    dir = %plugin.install_path().display(),
                    active = %active.install_path().display(),
                    "Plugin with this name is already active, skipping"
                );
                continue;
            }

            if let Some(object) = plugin.shared_object().map(str::to_string) {
                if let Err(e) = self.load_native(&host, &mut plugin, &object) {
                    warn!(
                        plugin = %plugin.name(),
                        dir = %plugin.install_path().display(),
                        error = %e,
                        "Plugin failed to activate, skipping"
                    );
                    continue;
                }
            }

            publish_web_content(&host, &plugin);

            if let Err(e) = Self::state_mut(&guard)?.registry.register(plugin) {
                warn!(error = %e, "Plugin not registered");
            }
        }

        let count = guard.borrow().registry.len();
        info!(count, "Plugin activation complete");
        Ok(count)
    }

    /// Open the plugin's shared object and run version negotiation and
    /// activation. The module is attached only when both succeed; on any
    /// failure it is dropped, which closes it.
    fn load_native(
        &self,
        host: &HostContext,
        plugin: &mut PluginDescriptor,
        object: &str,
    ) -> Result<()> {
        let path = join_in_dir(plugin.install_path(), object, "shared object")?;
        let module = self.loader.open(path.as_path())?;

        let mut info = PluginServerInfo::for_current_api();
        let ret = module.version_check(&mut info)?;
        if ret < 0 {
            return Err(HostError::Negotiation(format!(
                "version check rejected plugin API version {} ({})",
                PLUGIN_API_VERSION, ret
            )));
        }

        match info.host_version() {
            Some(built) if built != *host.version() => {
                return Err(HostError::Negotiation(format!(
                    "plugin was built against host {}, running host is {}",
                    built,
                    host.version()
                )));
            }
            Some(built) => info!(
                plugin = %plugin.name(),
                built_against = %built,
                host = %host.version(),
                "Plugin accepted plugin API version"
            ),
            None => debug!(plugin = %plugin.name(), "Plugin did not report its host version"),
        }

        let ret = module.activate(host)?;
        if ret < 0 {
            return Err(HostError::Negotiation(format!("activation returned {}", ret)));
        }

        plugin.set_module(module);
        Ok(())
    }

    /// Run the optional finalize hook of every native plugin, then launch a
    /// harness for every helper-only plugin.
    ///
    /// A helper binary named with a path component is fatal: the host's fatal
    /// condition is raised and the error returned. Everything else is
    /// isolated per plugin.
    pub fn finalize_plugins(&self) -> Result<()> {
        let host = self.host()?;
        let guard = self.inner.lock();
        Self::advance(
            &mut *Self::state_mut(&guard)?,
            LifecycleState::Activated,
            LifecycleState::Finalized,
            "finalize_plugins",
        )?;

        {
            let state = guard.borrow();
            for plugin in state.registry.iter() {
                let Some(module) = plugin.module() else {
                    continue;
                };
                match module.finalize(&host) {
                    None => debug!(plugin = %plugin.name(), "No finalize hook"),
                    Some(ret) if ret < 0 => warn!(
                        plugin = %plugin.name(),
                        ret,
                        "Plugin finalize hook failed"
                    ),
                    Some(_) => debug!(plugin = %plugin.name(), "Plugin finalized"),
                }
            }
        }

        let mut state = Self::state_mut(&guard)?;
        for plugin in state.registry.iter_mut() {
            if plugin.has_module() || plugin.harness().is_some() {
                continue;
            }
            let Some(binary) = plugin.http_helper().map(str::to_string) else {
                continue;
            };

            let prefix = plugin.http_prefix();
            match ExternalHttpHarness::launch(
                &host,
                plugin.name(),
                &prefix,
                &binary,
                &self.config.helper_binary_paths,
            ) {
                Ok(harness) => plugin.set_harness(harness),
                Err(e) => {
                    error!(
                        plugin = %plugin.name(),
                        binary = %binary,
                        error = %e,
                        "Refusing helper binary, aborting finalize"
                    );
                    return Err(e);
                }
            }
        }

        info!(count = state.registry.len(), "Plugin finalize complete");
        Ok(())
    }

    /// Release every plugin: harness first, then native module.
    pub async fn shutdown_plugins(&self) -> Result<()> {
        let (active, unactivated) = {
            let guard = self.inner.lock();
            let mut state = Self::state_mut(&guard)?;
            if state.state == LifecycleState::Shutdown {
                return Err(HostError::Lifecycle(
                    "shutdown_plugins called twice".to_string(),
                ));
            }
            state.state = LifecycleState::Shutdown;
            let active = state.registry.drain();
            let unactivated = std::mem::take(&mut state.preload);
            (active, unactivated)
        };

        let count = active.len();
        for plugin in active {
            debug!(plugin = %plugin.name(), "Releasing plugin");
            plugin.release().await;
        }
        drop(unactivated);

        if let Some(host) = self.host.upgrade() {
            host.remove_component(PLUGIN_TRACKER_COMPONENT);
        }

        info!(count, "Plugins shut down");
        Ok(())
    }

    /// Records of the active plugins, in activation order.
    pub fn snapshot(&self) -> Vec<PluginRecord> {
        let guard = self.inner.lock();
        let records = guard.borrow().registry.records();
        records
    }

    pub fn plugin_count(&self) -> usize {
        let guard = self.inner.lock();
        let count = guard.borrow().registry.len();
        count
    }

    /// The helper harness that serves `(path, method)`, if any.
    pub fn helper_for(&self, path: &str, method: &str) -> Option<HelperClient> {
        let guard = self.inner.lock();
        let state = guard.borrow();
        let client = state
            .registry
            .iter()
            .filter_map(PluginDescriptor::harness)
            .find(|harness| harness.verify_path(path, method))
            .map(ExternalHttpHarness::client);
        client
    }
}

/// Register a newly active plugin's web content with the host.
fn publish_web_content(host: &HostContext, plugin: &PluginDescriptor) {
    let prefix = plugin.http_prefix();

    let httpd = plugin.install_path().join("httpd");
    if httpd.is_dir() {
        host.web().register_static_dir(&prefix, &httpd);
        debug!(plugin = %plugin.name(), prefix = %prefix, "Registered static content");
    }

    if let Some(js) = plugin.js_module() {
        let uri = format!("{}js/{}", prefix, js);
        host.web().register_js_module(plugin.name(), &uri);
        debug!(plugin = %plugin.name(), uri = %uri, "Registered javascript module");
    }
}

impl fmt::Debug for PluginTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginTracker")
            .field("state", &self.state())
            .field("plugins", &self.plugin_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostVersion;
    use crate::http::{dispatch, HttpRequest};
    use crate::plugins::manifest::MANIFEST_FILE;
    use crate::plugins::native::{MockNativeModule, NativeModule};
    use std::collections::HashMap;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
        finalized: AtomicUsize,
        peeks: AtomicUsize,
    }

    #[derive(Clone, Copy)]
    struct Behaviour {
        version: i32,
        built_against: Option<(&'static str, &'static str, &'static str)>,
        activate: i32,
        finalize: Option<i32>,
        peek_tracker: bool,
    }

    impl Behaviour {
        fn ok() -> Self {
            Self {
                version: 0,
                built_against: None,
                activate: 0,
                finalize: None,
                peek_tracker: false,
            }
        }
    }

    struct FakeModule {
        behaviour: Behaviour,
        counters: Arc<Counters>,
    }

    impl NativeModule for FakeModule {
        fn version_check(&self, info: &mut PluginServerInfo) -> Result<i32> {
            assert_eq!(info.plugin_api_version, PLUGIN_API_VERSION);
            let built = match self.behaviour.built_against {
                Some((major, minor, tiny)) => HostVersion::new(major, minor, tiny),
                None => HostVersion::current(),
            };
            info.set_host_version(&built);
            Ok(self.behaviour.version)
        }

        fn activate(&self, host: &HostContext) -> Result<i32> {
            if self.behaviour.peek_tracker {
                let tracker = host
                    .component::<PluginTracker>(PLUGIN_TRACKER_COMPONENT)
                    .unwrap();
                let _ = tracker.snapshot();
                assert!(tracker.scan_plugins().is_err());
                self.counters.peeks.fetch_add(1, Ordering::SeqCst);
            }
            Ok(self.behaviour.activate)
        }

        fn finalize(&self, _host: &HostContext) -> Option<i32> {
            self.counters.finalized.fetch_add(1, Ordering::SeqCst);
            self.behaviour.finalize
        }
    }

    impl Drop for FakeModule {
        fn drop(&mut self) {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Opens fake modules keyed by shared object filename.
    struct FakeLoader {
        modules: HashMap<String, Behaviour>,
        counters: Arc<Counters>,
    }

    impl ModuleLoader for FakeLoader {
        fn open(&self, path: &Path) -> Result<Box<dyn NativeModule>> {
            let file = path.file_name().unwrap().to_string_lossy().into_owned();
            let behaviour = *self
                .modules
                .get(&file)
                .ok_or_else(|| HostError::Load(format!("cannot open {}", file)))?;
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeModule {
                behaviour,
                counters: self.counters.clone(),
            }))
        }
    }

    /// Hands out one prepared module.
    struct OnceLoader(Mutex<Option<Box<dyn NativeModule>>>);

    impl ModuleLoader for OnceLoader {
        fn open(&self, _path: &Path) -> Result<Box<dyn NativeModule>> {
            self.0
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| HostError::Load("already opened".to_string()))
        }
    }

    fn write_plugin(root: &Path, dirname: &str, name: &str, extra: &str) -> PathBuf {
        let dir = root.join(dirname);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(MANIFEST_FILE),
            format!(
                "name={}\ndescription={} plugin\nauthor=Tester\nversion=1.0.0\n{}",
                name, name, extra
            ),
        )
        .unwrap();
        dir
    }

    fn config_for(roots: &[&Path]) -> PluginsConfig {
        PluginsConfig {
            plugin_dirs: roots.iter().map(|r| r.display().to_string()).collect(),
            ..Default::default()
        }
    }

    fn tracker_with(
        config: PluginsConfig,
        modules: &[(&str, Behaviour)],
    ) -> (Arc<HostContext>, Arc<PluginTracker>, Arc<Counters>) {
        let host = Arc::new(HostContext::new(HostVersion::current()));
        let counters = Arc::new(Counters::default());
        let loader = FakeLoader {
            modules: modules
                .iter()
                .map(|(file, b)| (file.to_string(), *b))
                .collect(),
            counters: counters.clone(),
        };
        let tracker = PluginTracker::with_loader(&host, config, Box::new(loader));
        (host, tracker, counters)
    }

    fn names(tracker: &PluginTracker) -> Vec<String> {
        tracker.snapshot().into_iter().map(|r| r.name).collect()
    }

    #[tokio::test]
    async fn test_version_check_failure_is_isolated() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "alpha", "alpha", "object=libalpha.so\n");
        write_plugin(tmp.path(), "beta", "beta", "object=libbeta.so\n");

        let rejecting = Behaviour {
            version: -1,
            ..Behaviour::ok()
        };
        let (_host, tracker, counters) = tracker_with(
            config_for(&[tmp.path()]),
            &[("libalpha.so", Behaviour::ok()), ("libbeta.so", rejecting)],
        );

        assert_eq!(tracker.scan_plugins().unwrap(), 2);
        assert_eq!(tracker.activate_plugins().unwrap(), 1);
        assert_eq!(names(&tracker), vec!["alpha"]);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

        let endpoint = crate::plugins::PluginIntrospection::new(tracker.clone());
        let response = dispatch(
            &endpoint,
            &HttpRequest::get(crate::plugins::INTROSPECTION_PATH),
        )
        .await;
        let listed: Vec<serde_json::Value> = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["name"], "alpha");

        tracker.finalize_plugins().unwrap();
        tracker.shutdown_plugins().await.unwrap();
        assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
        assert!(tracker.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_activation_rejection_closes_module() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "alpha", "alpha", "object=libalpha.so\n");

        let rejecting = Behaviour {
            activate: -5,
            ..Behaviour::ok()
        };
        let (_host, tracker, counters) =
            tracker_with(config_for(&[tmp.path()]), &[("libalpha.so", rejecting)]);

        tracker.scan_plugins().unwrap();
        assert_eq!(tracker.activate_plugins().unwrap(), 0);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

        tracker.shutdown_plugins().await.unwrap();
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mismatched_build_version_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "alpha", "alpha", "object=libalpha.so\n");
        write_plugin(tmp.path(), "beta", "beta", "object=libbeta.so\n");

        let stale = Behaviour {
            built_against: Some(("99", "0", "0")),
            ..Behaviour::ok()
        };
        let (_host, tracker, counters) = tracker_with(
            config_for(&[tmp.path()]),
            &[("libalpha.so", stale), ("libbeta.so", Behaviour::ok())],
        );

        tracker.scan_plugins().unwrap();
        assert_eq!(tracker.activate_plugins().unwrap(), 1);
        assert_eq!(names(&tracker), vec!["beta"]);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

        tracker.shutdown_plugins().await.unwrap();
        assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_compiled_plugins_through_dynamic_linker() {
        use crate::plugins::native::fixtures;

        let tmp = TempDir::new().unwrap();
        let good = write_plugin(tmp.path(), "good", "good", "object=libgood.so\n");
        let bad = write_plugin(tmp.path(), "bad", "bad", "object=libbad.so\n");
        if fixtures::build(&good, "libgood.so", fixtures::GOOD).is_none()
            || fixtures::build(&bad, "libbad.so", fixtures::REJECTING).is_none()
        {
            return;
        }

        let host = Arc::new(HostContext::new(HostVersion::current()));
        let tracker = PluginTracker::create(&host, config_for(&[tmp.path()]));
        assert_eq!(tracker.scan_plugins().unwrap(), 2);
        assert_eq!(tracker.activate_plugins().unwrap(), 1);
        assert_eq!(names(&tracker), vec!["good"]);

        tracker.finalize_plugins().unwrap();
        tracker.shutdown_plugins().await.unwrap();
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn test_unloadable_object_is_skipped() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "alpha", "alpha", "object=libmissing.so\n");
        write_plugin(tmp.path(), "beta", "beta", "");

        let (_host, tracker, counters) = tracker_with(config_for(&[tmp.path()]), &[]);
        tracker.scan_plugins().unwrap();
        assert_eq!(tracker.activate_plugins().unwrap(), 1);
        assert_eq!(names(&tracker), vec!["beta"]);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_activation_preserves_discovery_order() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "a-dir", "zeta", "");
        write_plugin(tmp.path(), "b-dir", "alpha", "object=libalpha.so\n");
        write_plugin(tmp.path(), "c-dir", "mid", "httpexternal=mid_helper\n");

        let (_host, tracker, _) =
            tracker_with(config_for(&[tmp.path()]), &[("libalpha.so", Behaviour::ok())]);
        tracker.scan_plugins().unwrap();
        tracker.activate_plugins().unwrap();

        assert_eq!(names(&tracker), vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_lifecycle_order_is_enforced() {
        let tmp = TempDir::new().unwrap();
        let (_host, tracker, _) = tracker_with(config_for(&[tmp.path()]), &[]);
        assert_eq!(tracker.state(), LifecycleState::Uninitialized);

        assert!(matches!(
            tracker.activate_plugins(),
            Err(HostError::Lifecycle(_))
        ));
        assert!(matches!(
            tracker.finalize_plugins(),
            Err(HostError::Lifecycle(_))
        ));

        tracker.scan_plugins().unwrap();
        assert!(matches!(tracker.scan_plugins(), Err(HostError::Lifecycle(_))));
        assert_eq!(tracker.state(), LifecycleState::Scanned);

        tracker.activate_plugins().unwrap();
        tracker.finalize_plugins().unwrap();
        assert!(matches!(
            tracker.finalize_plugins(),
            Err(HostError::Lifecycle(_))
        ));
        assert_eq!(tracker.state(), LifecycleState::Finalized);

        tracker.shutdown_plugins().await.unwrap();
        assert_eq!(tracker.state(), LifecycleState::Shutdown);
        assert!(matches!(
            tracker.shutdown_plugins().await,
            Err(HostError::Lifecycle(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_before_activation_releases_preload() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "alpha", "alpha", "object=libalpha.so\n");
        let (_host, tracker, counters) =
            tracker_with(config_for(&[tmp.path()]), &[("libalpha.so", Behaviour::ok())]);

        tracker.scan_plugins().unwrap();
        tracker.shutdown_plugins().await.unwrap();
        assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
        assert!(matches!(
            tracker.activate_plugins(),
            Err(HostError::Lifecycle(_))
        ));
    }

    #[test]
    fn test_finalize_hook_results_are_isolated() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "a", "a", "object=liba.so\n");
        write_plugin(tmp.path(), "b", "b", "object=libb.so\n");
        write_plugin(tmp.path(), "c", "c", "object=libc.so\n");

        let (_host, tracker, counters) = tracker_with(
            config_for(&[tmp.path()]),
            &[
                ("liba.so", Behaviour::ok()),
                (
                    "libb.so",
                    Behaviour {
                        finalize: Some(-1),
                        ..Behaviour::ok()
                    },
                ),
                (
                    "libc.so",
                    Behaviour {
                        finalize: Some(0),
                        ..Behaviour::ok()
                    },
                ),
            ],
        );

        tracker.scan_plugins().unwrap();
        tracker.activate_plugins().unwrap();
        tracker.finalize_plugins().unwrap();

        assert_eq!(counters.finalized.load(Ordering::SeqCst), 3);
        assert_eq!(names(&tracker), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_plugin_callback_can_reenter_tracker() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "alpha", "alpha", "object=libalpha.so\n");

        let peeking = Behaviour {
            peek_tracker: true,
            ..Behaviour::ok()
        };
        let (_host, tracker, counters) =
            tracker_with(config_for(&[tmp.path()]), &[("libalpha.so", peeking)]);

        tracker.scan_plugins().unwrap();
        assert_eq!(tracker.activate_plugins().unwrap(), 1);
        assert_eq!(counters.peeks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_blocked_and_duplicate_plugins_are_skipped() {
        let system = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        write_plugin(system.path(), "alpha", "alpha", "");
        write_plugin(system.path(), "beta", "beta", "");
        write_plugin(user.path(), "alpha", "alpha", "");

        let mut config = config_for(&[system.path(), user.path()]);
        config.blocked_plugins = vec!["beta".to_string()];
        let (_host, tracker, _) = tracker_with(config, &[]);

        assert_eq!(tracker.scan_plugins().unwrap(), 3);
        assert_eq!(tracker.activate_plugins().unwrap(), 1);

        let records = tracker.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, system.path().join("alpha").display().to_string());
    }

    #[test]
    fn test_disabled_plugin_system_scans_nothing() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "alpha", "alpha", "");

        let mut config = config_for(&[tmp.path()]);
        config.enabled = false;
        let (_host, tracker, _) = tracker_with(config, &[]);

        assert_eq!(tracker.scan_plugins().unwrap(), 0);
        assert_eq!(tracker.activate_plugins().unwrap(), 0);
    }

    #[test]
    fn test_web_content_is_published_on_activation() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "alpha-dir", "alpha", "js=alpha.js\n");
        fs::create_dir(dir.join("httpd")).unwrap();

        let (host, tracker, _) = tracker_with(config_for(&[tmp.path()]), &[]);
        tracker.scan_plugins().unwrap();
        tracker.activate_plugins().unwrap();

        assert_eq!(host.web().static_prefixes(), vec!["/plugin/alpha-dir/"]);
        assert_eq!(
            host.web().resolve_static("/plugin/alpha-dir/index.html"),
            Some(dir.join("httpd").join("index.html"))
        );
        let modules = host.web().js_modules();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].plugin, "alpha");
        assert_eq!(modules[0].uri, "/plugin/alpha-dir/js/alpha.js");
    }

    #[test]
    fn test_helper_binary_with_path_is_fatal() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "beta", "beta", "httpexternal=../bin/helper\n");

        let (host, tracker, _) = tracker_with(config_for(&[tmp.path()]), &[]);
        tracker.scan_plugins().unwrap();
        tracker.activate_plugins().unwrap();

        let err = tracker.finalize_plugins().unwrap_err();
        assert!(matches!(err, HostError::SecurityViolation(_)));
        assert!(host.is_fatal());

        tokio_test::block_on(tracker.shutdown_plugins()).unwrap();
        assert_eq!(tracker.state(), LifecycleState::Shutdown);
    }

    #[tokio::test]
    async fn test_missing_helper_leaves_inert_harness() {
        let tmp = TempDir::new().unwrap();
        let helpers = TempDir::new().unwrap();
        write_plugin(tmp.path(), "beta", "beta", "httpexternal=beta_helper\n");

        let mut config = config_for(&[tmp.path()]);
        config.helper_binary_paths = vec![helpers.path().display().to_string()];
        let (host, tracker, _) = tracker_with(config, &[]);

        tracker.scan_plugins().unwrap();
        tracker.activate_plugins().unwrap();
        tracker.finalize_plugins().unwrap();
        assert!(!host.is_fatal());

        let client = tracker.helper_for("/plugin/beta/index.html", "GET").unwrap();
        let response = dispatch(&client, &HttpRequest::get("/plugin/beta/index.html")).await;
        assert_eq!(response.status, 503);
        assert!(tracker.helper_for("/plugin/other/", "GET").is_none());

        tracker.shutdown_plugins().await.unwrap();
        let response = dispatch(&client, &HttpRequest::get("/plugin/beta/index.html")).await;
        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn test_helper_and_static_content_share_prefix() {
        let tmp = TempDir::new().unwrap();
        let helpers = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "beta-dir", "beta", "httpexternal=beta_helper\n");
        fs::create_dir(dir.join("httpd")).unwrap();

        let mut config = config_for(&[tmp.path()]);
        config.helper_binary_paths = vec![helpers.path().display().to_string()];
        let (host, tracker, _) = tracker_with(config, &[]);

        tracker.scan_plugins().unwrap();
        tracker.activate_plugins().unwrap();
        tracker.finalize_plugins().unwrap();

        assert_eq!(host.web().static_prefixes(), vec!["/plugin/beta-dir/"]);
        assert!(tracker.helper_for("/plugin/beta-dir/status", "GET").is_some());
        assert!(tracker.helper_for("/plugin/beta/status", "GET").is_none());

        tracker.shutdown_plugins().await.unwrap();
    }

    #[tokio::test]
    async fn test_mock_module_entry_points_called_once() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "alpha", "alpha", "object=libalpha.so\n");

        let mut module = MockNativeModule::new();
        module
            .expect_version_check()
            .times(1)
            .returning(|info| {
                Ok(if info.plugin_api_version == PLUGIN_API_VERSION {
                    0
                } else {
                    -1
                })
            });
        module.expect_activate().times(1).returning(|_| Ok(1));
        module.expect_finalize().times(1).returning(|_| Some(0));

        let host = Arc::new(HostContext::new(HostVersion::current()));
        let module: Box<dyn NativeModule> = Box::new(module);
        let loader = OnceLoader(Mutex::new(Some(module)));
        let tracker =
            PluginTracker::with_loader(&host, config_for(&[tmp.path()]), Box::new(loader));

        tracker.scan_plugins().unwrap();
        assert_eq!(tracker.activate_plugins().unwrap(), 1);
        tracker.finalize_plugins().unwrap();
        tracker.shutdown_plugins().await.unwrap();
    }

    #[tokio::test]
    async fn test_tracker_registers_as_host_component() {
        let tmp = TempDir::new().unwrap();
        let (host, tracker, _) = tracker_with(config_for(&[tmp.path()]), &[]);

        let found = host
            .component::<PluginTracker>(PLUGIN_TRACKER_COMPONENT)
            .unwrap();
        assert!(Arc::ptr_eq(&found, &tracker));
        drop(found);

        tracker.scan_plugins().unwrap();
        tracker.shutdown_plugins().await.unwrap();
        assert!(host
            .component::<PluginTracker>(PLUGIN_TRACKER_COMPONENT)
            .is_none());
    }
}
