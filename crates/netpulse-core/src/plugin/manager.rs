//! The plugin manager: discovery, loading, compatibility validation,
//! lifecycle, queries, and state persistence.
//!
//! The manager is a passive, lock-protected object with no threads of
//! its own. Its registry lock is independent of the context's locks and
//! no operation holds more than one lock at a time; in particular,
//! extension code is never invoked while the registry lock is held, so a
//! plugin may call back into the manager from any of its entry points.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{event_names, ContextPaths, PluginContext};
use crate::plugin::{
    is_plugin_module, panic_message, DataProcessor, LifecycleState, Plugin, PluginError,
    PluginHandle, PluginKind, PluginManifest, PluginMetadata, PluginModule, Result,
};
use crate::version::is_version_compatible;

/// Observer invoked with a plugin id after a load or unload.
pub type PluginObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Observer invoked with the failing subject (plugin id or module path)
/// and the error for every reported plugin fault.
pub type PluginErrorObserver = Arc<dyn Fn(&str, &PluginError) + Send + Sync>;

#[derive(Default)]
struct Observers {
    loaded: Vec<PluginObserver>,
    unloaded: Vec<PluginObserver>,
    errors: Vec<PluginErrorObserver>,
}

/// A plugin registered with the manager.
pub struct LoadedPlugin {
    /// Metadata captured at load time.
    pub metadata: PluginMetadata,

    /// The shared instance handle.
    pub handle: Arc<PluginHandle>,

    /// Origin module path; `None` for in-process registrations.
    pub path: Option<PathBuf>,

    /// Whether the handle keeps a dynamic module open that the host
    /// must eventually release.
    pub owns_library: bool,

    /// When the plugin was registered.
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedPlugin {
    id: String,
    #[serde(default)]
    path: Option<PathBuf>,
    enabled: bool,
    configuration: Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    plugins: Vec<PersistedPlugin>,
}

/// Manages the full lifecycle of NetPulse plugins.
///
/// Loading and initialization are distinct steps: a host loads many
/// plugins first, so that inter-plugin dependencies can be satisfied,
/// and then initializes them in an order of its choosing.
pub struct PluginManager {
    plugins: Mutex<HashMap<String, LoadedPlugin>>,
    // Ids whose last initialization attempt failed; skipped by
    // `initialize_all` until explicitly retried.
    failed_inits: Mutex<HashSet<String>>,
    observers: Mutex<Observers>,
    context: Arc<PluginContext>,
    host_version: String,
}

impl PluginManager {
    /// Create a manager for the given host version with default paths.
    pub fn new(host_version: impl Into<String>) -> Self {
        let host_version = host_version.into();
        let context = Arc::new(PluginContext::new(
            host_version.clone(),
            ContextPaths::default(),
        ));
        Self {
            plugins: Mutex::new(HashMap::new()),
            failed_inits: Mutex::new(HashSet::new()),
            observers: Mutex::new(Observers::default()),
            context,
            host_version,
        }
    }

    /// Create a manager around an existing shared context. The host
    /// version is taken from the context.
    pub fn with_context(context: Arc<PluginContext>) -> Self {
        let host_version = context.host_version().to_string();
        Self {
            plugins: Mutex::new(HashMap::new()),
            failed_inits: Mutex::new(HashSet::new()),
            observers: Mutex::new(Observers::default()),
            context,
            host_version,
        }
    }

    /// The shared context handed to plugins at initialization.
    pub fn context(&self) -> Arc<PluginContext> {
        Arc::clone(&self.context)
    }

    /// Version string of the running host.
    pub fn host_version(&self) -> &str {
        &self.host_version
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Register an observer invoked after every successful load.
    pub fn on_plugin_loaded<F>(&self, observer: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.observers.lock().loaded.push(Arc::new(observer));
    }

    /// Register an observer invoked after every unload.
    pub fn on_plugin_unloaded<F>(&self, observer: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.observers.lock().unloaded.push(Arc::new(observer));
    }

    /// Register an observer invoked for every reported plugin error.
    pub fn on_plugin_error<F>(&self, observer: F)
    where
        F: Fn(&str, &PluginError) + Send + Sync + 'static,
    {
        self.observers.lock().errors.push(Arc::new(observer));
    }

    fn notify_loaded(&self, id: &str) {
        let observers: Vec<PluginObserver> = self.observers.lock().loaded.to_vec();
        for observer in observers {
            observer(id);
        }
    }

    fn notify_unloaded(&self, id: &str) {
        let observers: Vec<PluginObserver> = self.observers.lock().unloaded.to_vec();
        for observer in observers {
            observer(id);
        }
    }

    fn report_error(&self, subject: &str, error: &PluginError) {
        tracing::warn!(target: "netpulse::plugin", plugin = subject, "{}", error);
        let observers: Vec<PluginErrorObserver> = self.observers.lock().errors.to_vec();
        for observer in observers {
            observer(subject, error);
        }
    }

    // ------------------------------------------------------------------
    // Discovery and loading
    // ------------------------------------------------------------------

    /// Scan a directory for plugin modules with parseable sidecar
    /// manifests. Malformed manifests are logged and skipped; discovery
    /// itself never fails.
    pub fn discover_plugins(&self, dir: &Path) -> Vec<PluginManifest> {
        let mut discovered = Vec::new();

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    target: "netpulse::plugin",
                    "cannot read plugin directory {:?}: {}",
                    dir,
                    e
                );
                return discovered;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !is_plugin_module(&path) {
                continue;
            }
            match PluginManifest::for_module(&path) {
                Ok(manifest) => {
                    tracing::info!(
                        target: "netpulse::plugin",
                        plugin = %manifest.metadata.id,
                        "discovered plugin module {:?}",
                        path
                    );
                    discovered.push(manifest);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "netpulse::plugin",
                        "skipping module {:?}: {}",
                        path,
                        e
                    );
                }
            }
        }

        discovered
    }

    /// Load a plugin module from disk. The plugin ends up `Loaded`, not
    /// initialized; call [`initialize_plugin`](Self::initialize_plugin)
    /// separately. Returns the new plugin's id.
    pub fn load_plugin(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();

        if !path.exists() {
            let err = PluginError::ModuleNotFound(path.to_path_buf());
            self.report_error(&path.display().to_string(), &err);
            return Err(err);
        }

        let module = match PluginModule::open(path) {
            Ok(module) => module,
            Err(err) => {
                self.report_error(&path.display().to_string(), &err);
                return Err(err);
            }
        };

        let handle = match module.instantiate() {
            Ok(handle) => handle,
            Err(err) => {
                self.report_error(&path.display().to_string(), &err);
                return Err(err);
            }
        };

        let metadata = match catch_unwind(AssertUnwindSafe(|| handle.metadata())) {
            Ok(metadata) => metadata,
            Err(panic) => {
                // Dropping the handle destroys the instance and closes
                // the module, in that order.
                let err = PluginError::ConstructionFailed(panic_message(panic));
                self.report_error(&path.display().to_string(), &err);
                return Err(err);
            }
        };

        self.install(metadata, Arc::new(handle), Some(path.to_path_buf()), true)
    }

    /// Register an in-process plugin instance (built-in plugins). Goes
    /// through the same validation and duplicate checks as a module
    /// load. Returns the plugin's id.
    pub fn register_plugin(&self, plugin: Box<dyn Plugin>) -> Result<String> {
        let handle = PluginHandle::from_instance(plugin);
        let metadata = match catch_unwind(AssertUnwindSafe(|| handle.metadata())) {
            Ok(metadata) => metadata,
            Err(panic) => {
                let err = PluginError::ConstructionFailed(panic_message(panic));
                self.report_error("<in-process>", &err);
                return Err(err);
            }
        };
        self.install(metadata, Arc::new(handle), None, false)
    }

    fn install(
        &self,
        metadata: PluginMetadata,
        handle: Arc<PluginHandle>,
        path: Option<PathBuf>,
        owns_library: bool,
    ) -> Result<String> {
        if let Err(err) = self.validate_dependencies(&metadata) {
            self.report_error(&metadata.id, &err);
            return Err(err);
        }

        let id = metadata.id.clone();
        let full_id = metadata.full_id();
        {
            let mut plugins = self.plugins.lock();
            if plugins.contains_key(&id) {
                drop(plugins);
                let err = PluginError::DuplicateId(id.clone());
                self.report_error(&id, &err);
                return Err(err);
            }
            plugins.insert(
                id.clone(),
                LoadedPlugin {
                    metadata,
                    handle,
                    path,
                    owns_library,
                    loaded_at: Utc::now(),
                },
            );
        }

        tracing::info!(target: "netpulse::plugin", plugin = %full_id, "plugin loaded");
        self.notify_loaded(&id);
        Ok(id)
    }

    /// Validate host-version and dependency compatibility for metadata.
    ///
    /// This is a point check against the registry as it is right now;
    /// unloading a dependency later does not cascade to dependents.
    pub fn validate_dependencies(&self, metadata: &PluginMetadata) -> Result<()> {
        if !is_version_compatible(&metadata.min_host_version, &self.host_version) {
            return Err(PluginError::DependencyUnsatisfied(format!(
                "{} requires host {} but the host is {}",
                metadata.id, metadata.min_host_version, self.host_version
            )));
        }

        let plugins = self.plugins.lock();
        for dep in &metadata.dependencies {
            let loaded_version = plugins
                .get(&dep.plugin_id)
                .map(|p| p.metadata.version.clone());

            let satisfied = loaded_version
                .as_deref()
                .map(|v| is_version_compatible(&dep.min_version, v))
                .unwrap_or(false);

            if satisfied {
                continue;
            }
            if dep.required {
                return Err(PluginError::DependencyUnsatisfied(format!(
                    "{} requires {} >= {} but {}",
                    metadata.id,
                    dep.plugin_id,
                    dep.min_version,
                    match loaded_version {
                        Some(v) => format!("version {} is loaded", v),
                        None => "it is not loaded".to_string(),
                    }
                )));
            }
            tracing::debug!(
                target: "netpulse::plugin",
                plugin = %metadata.id,
                dependency = %dep.plugin_id,
                "optional dependency not satisfied"
            );
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Initialize a loaded plugin with the shared context.
    ///
    /// A no-op success if the plugin is already at `Initialized` or
    /// beyond. A panic or a `false` return from the plugin are both
    /// reported as `InitializationFailed`; the plugin stays at its
    /// pre-call state. A direct call is always an explicit retry and
    /// clears the failure mark that makes `initialize_all` skip it.
    pub fn initialize_plugin(&self, id: &str) -> Result<()> {
        let handle = self
            .get_plugin(id)
            .ok_or_else(|| PluginError::NotFound(id.to_string()))?;

        if handle.state().is_initialized() {
            self.failed_inits.lock().remove(id);
            return Ok(());
        }

        let context = Arc::clone(&self.context);
        match catch_unwind(AssertUnwindSafe(|| handle.initialize(context))) {
            Ok(true) => {
                self.failed_inits.lock().remove(id);
                tracing::info!(target: "netpulse::plugin", plugin = id, "plugin initialized");
                Ok(())
            }
            Ok(false) => {
                self.failed_inits.lock().insert(id.to_string());
                let err =
                    PluginError::InitializationFailed(format!("{} rejected initialization", id));
                self.report_error(id, &err);
                Err(err)
            }
            Err(panic) => {
                self.failed_inits.lock().insert(id.to_string());
                let err = PluginError::InitializationFailed(panic_message(panic));
                self.report_error(id, &err);
                Err(err)
            }
        }
    }

    /// Initialize every loaded plugin, skipping ones whose last attempt
    /// failed. Returns the number initialized (or already initialized).
    pub fn initialize_all(&self) -> usize {
        self.loaded_ids()
            .iter()
            .filter(|id| !self.failed_inits.lock().contains(id.as_str()))
            .filter(|id| self.initialize_plugin(id).is_ok())
            .count()
    }

    /// Shut down every plugin at `Initialized` or beyond. A fault in one
    /// plugin's shutdown is logged and never blocks the rest.
    pub fn shutdown_all_plugins(&self) {
        let handles: Vec<(String, Arc<PluginHandle>)> = {
            let plugins = self.plugins.lock();
            plugins
                .iter()
                .map(|(id, p)| (id.clone(), Arc::clone(&p.handle)))
                .collect()
        };

        for (id, handle) in handles {
            if !handle.state().is_initialized() {
                continue;
            }
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handle.shutdown())) {
                tracing::warn!(
                    target: "netpulse::plugin",
                    plugin = %id,
                    "shutdown panicked: {}",
                    panic_message(panic)
                );
            }
        }
    }

    /// Unload a plugin: remove it from the registry, shut it down if
    /// needed, and release the manager's reference. The module itself is
    /// closed once the last outstanding handle is dropped. Returns
    /// `false` for an unknown id.
    pub fn unload_plugin(&self, id: &str) -> bool {
        // Removal happens before shutdown so re-entrant lookups during
        // shutdown cannot observe the plugin as still loaded.
        let removed = self.plugins.lock().remove(id);
        let Some(loaded) = removed else {
            tracing::debug!(target: "netpulse::plugin", plugin = id, "unload of unknown plugin");
            return false;
        };
        self.failed_inits.lock().remove(id);

        if loaded.handle.state().is_initialized() {
            let handle = Arc::clone(&loaded.handle);
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handle.shutdown())) {
                tracing::warn!(
                    target: "netpulse::plugin",
                    plugin = id,
                    "shutdown panicked: {}",
                    panic_message(panic)
                );
            }
        }

        drop(loaded);
        tracing::info!(target: "netpulse::plugin", plugin = id, "plugin unloaded");
        self.notify_unloaded(id);
        true
    }

    /// Unload every currently loaded plugin.
    pub fn unload_all_plugins(&self) {
        for id in self.loaded_ids() {
            self.unload_plugin(&id);
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Look up a plugin handle by id.
    pub fn get_plugin(&self, id: &str) -> Option<Arc<PluginHandle>> {
        self.plugins.lock().get(id).map(|p| Arc::clone(&p.handle))
    }

    /// Metadata of a loaded plugin, as captured at load time.
    pub fn plugin_metadata(&self, id: &str) -> Option<PluginMetadata> {
        self.plugins.lock().get(id).map(|p| p.metadata.clone())
    }

    /// Handles of all loaded plugins.
    pub fn plugins(&self) -> Vec<Arc<PluginHandle>> {
        self.plugins
            .lock()
            .values()
            .map(|p| Arc::clone(&p.handle))
            .collect()
    }

    /// Handles of all loaded plugins of a declared kind.
    pub fn plugins_by_kind(&self, kind: PluginKind) -> Vec<Arc<PluginHandle>> {
        self.plugins
            .lock()
            .values()
            .filter(|p| p.metadata.kind == kind)
            .map(|p| Arc::clone(&p.handle))
            .collect()
    }

    /// Plugins implementing the data-processor capability. Capability
    /// implementation is checked at runtime; metadata capability strings
    /// play no part.
    pub fn data_processors(&self) -> Vec<Arc<PluginHandle>> {
        self.plugins_with(|p| p.as_data_processor().is_some())
    }

    /// Plugins implementing the network-monitor capability.
    pub fn network_monitors(&self) -> Vec<Arc<PluginHandle>> {
        self.plugins_with(|p| p.as_network_monitor().is_some())
    }

    /// Plugins implementing the notification-handler capability.
    pub fn notification_handlers(&self) -> Vec<Arc<PluginHandle>> {
        self.plugins_with(|p| p.as_notification_handler().is_some())
    }

    /// Plugins implementing the data-exporter capability.
    pub fn data_exporters(&self) -> Vec<Arc<PluginHandle>> {
        self.plugins_with(|p| p.as_data_exporter().is_some())
    }

    fn plugins_with(&self, predicate: impl Fn(&dyn Plugin) -> bool) -> Vec<Arc<PluginHandle>> {
        self.plugins()
            .into_iter()
            .filter(|h| predicate(h.plugin()))
            .collect()
    }

    /// Whether a plugin with the given id is loaded.
    pub fn is_loaded(&self, id: &str) -> bool {
        self.plugins.lock().contains_key(id)
    }

    /// Lifecycle state of a plugin; `Unloaded` for unknown ids.
    pub fn plugin_state(&self, id: &str) -> LifecycleState {
        self.get_plugin(id)
            .map(|h| h.state())
            .unwrap_or(LifecycleState::Unloaded)
    }

    /// Ids of all loaded plugins.
    pub fn loaded_ids(&self) -> Vec<String> {
        self.plugins.lock().keys().cloned().collect()
    }

    /// Number of loaded plugins.
    pub fn plugin_count(&self) -> usize {
        self.plugins.lock().len()
    }

    // ------------------------------------------------------------------
    // Monitoring event fan-out
    // ------------------------------------------------------------------

    /// Relay a ping result from the monitoring engine: publish it on the
    /// context bus and fire every data processor's hook.
    pub fn notify_ping_result(&self, payload: &Value) {
        self.context.publish(event_names::PING_RESULT, payload);
        self.dispatch_processor_hook(payload, |p, v| p.on_ping_result(v));
    }

    /// Relay a raised alert.
    pub fn notify_alert(&self, payload: &Value) {
        self.context.publish(event_names::ALERT_RAISED, payload);
        self.dispatch_processor_hook(payload, |p, v| p.on_alert(v));
    }

    /// Relay a completed scan.
    pub fn notify_scan_complete(&self, payload: &Value) {
        self.context.publish(event_names::SCAN_COMPLETE, payload);
        self.dispatch_processor_hook(payload, |p, v| p.on_scan_complete(v));
    }

    fn dispatch_processor_hook(
        &self,
        payload: &Value,
        hook: impl Fn(&dyn DataProcessor, &Value),
    ) {
        let handles: Vec<(String, Arc<PluginHandle>)> = {
            let plugins = self.plugins.lock();
            plugins
                .iter()
                .map(|(id, p)| (id.clone(), Arc::clone(&p.handle)))
                .collect()
        };

        for (id, handle) in handles {
            if let Some(processor) = handle.as_data_processor() {
                let result = catch_unwind(AssertUnwindSafe(|| hook(processor, payload)));
                if let Err(panic) = result {
                    tracing::warn!(
                        target: "netpulse::plugin",
                        plugin = %id,
                        "data processor hook panicked: {}",
                        panic_message(panic)
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // State persistence
    // ------------------------------------------------------------------

    /// Persist the id, origin path, enabled flag, and configuration of
    /// every loaded plugin to a JSON document.
    pub fn save_state(&self, path: &Path) -> Result<()> {
        let snapshot: Vec<(String, Arc<PluginHandle>, Option<PathBuf>)> = {
            let plugins = self.plugins.lock();
            plugins
                .values()
                .map(|p| (p.metadata.id.clone(), Arc::clone(&p.handle), p.path.clone()))
                .collect()
        };

        let mut state = PersistedState::default();
        for (id, handle, module_path) in snapshot {
            let enabled =
                catch_unwind(AssertUnwindSafe(|| handle.is_enabled())).unwrap_or(true);
            let configuration = catch_unwind(AssertUnwindSafe(|| handle.configuration()))
                .unwrap_or_else(|_| Value::Object(Default::default()));
            state.plugins.push(PersistedPlugin {
                id,
                path: module_path,
                enabled,
                configuration,
            });
        }

        let doc = serde_json::to_string_pretty(&state)?;
        std::fs::write(path, doc)?;
        Ok(())
    }

    /// Restore a previously saved plugin set: load each recorded module,
    /// initialize it, and apply the recorded configuration and enabled
    /// flag. An absent file is a no-op success; a corrupt file degrades
    /// to empty; a failing entry is skipped without affecting the rest.
    pub fn load_state(&self, path: &Path) -> Result<()> {
        self.load_state_with(path, |manager, module| manager.load_plugin(module))
    }

    /// Like [`load_state`](Self::load_state) with a caller-supplied load
    /// step, for hosts that resolve recorded module paths themselves
    /// (relocated plugin directories, bundled builtins). The load step
    /// returns the id of the plugin it registered.
    pub fn load_state_with<F>(&self, path: &Path, load: F) -> Result<()>
    where
        F: Fn(&Self, &Path) -> Result<String>,
    {
        if !path.exists() {
            return Ok(());
        }

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    target: "netpulse::plugin",
                    "cannot read plugin state file {:?}: {}",
                    path,
                    e
                );
                return Ok(());
            }
        };

        let state: PersistedState = match serde_json::from_str(&text) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    target: "netpulse::plugin",
                    "corrupt plugin state file {:?}: {}",
                    path,
                    e
                );
                return Ok(());
            }
        };

        for entry in state.plugins {
            let Some(module_path) = entry.path else {
                tracing::debug!(
                    target: "netpulse::plugin",
                    plugin = %entry.id,
                    "skipping persisted in-process plugin"
                );
                continue;
            };

            let id = match load(self, &module_path) {
                Ok(id) => id,
                // Already reported through the error observers.
                Err(_) => continue,
            };
            if id != entry.id {
                tracing::warn!(
                    target: "netpulse::plugin",
                    "module {:?} now reports id {} (state recorded {})",
                    module_path,
                    id,
                    entry.id
                );
            }

            if self.initialize_plugin(&id).is_err() {
                continue;
            }

            if let Some(handle) = self.get_plugin(&id) {
                let configuration = entry.configuration;
                let _ = catch_unwind(AssertUnwindSafe(|| handle.configure(&configuration)));
                let _ = catch_unwind(AssertUnwindSafe(|| {
                    if entry.enabled {
                        handle.enable()
                    } else {
                        handle.disable()
                    }
                }));
            }
        }

        Ok(())
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}
