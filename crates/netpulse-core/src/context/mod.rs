//! Shared context handed to every plugin at initialization.
//!
//! The context is owned by the manager and outlives every plugin. It
//! provides four things: a named service registry, a publish/subscribe
//! event bus, read-only path accessors, and a leveled logging sink that
//! attributes messages to the plugin subsystem.
//!
//! All operations are safe to call concurrently from any plugin thread.
//! The service registry and the subscription list are guarded by
//! independent locks and no operation ever holds more than one of them.

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

pub mod events;

pub use events::{names as event_names, EventBus, EventCallback};

/// Weak reference to a registered service object.
///
/// The registry takes no ownership: the registrant keeps the owning
/// `Arc` and must unregister before dropping it. A lookup whose target
/// has already been dropped behaves as if the name were absent.
pub type ServiceRef = Weak<dyn Any + Send + Sync>;

/// Log level accepted by the context's logging sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// The standard host directories exposed to plugins, fixed for the
/// lifetime of the context.
#[derive(Debug, Clone)]
pub struct ContextPaths {
    /// Host configuration directory.
    pub config_dir: PathBuf,

    /// Host data directory.
    pub data_dir: PathBuf,

    /// Directory scanned for plugin modules.
    pub plugin_dir: PathBuf,
}

impl Default for ContextPaths {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("netpulse");
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("netpulse");
        let plugin_dir = data_dir.join("plugins");
        Self {
            config_dir,
            data_dir,
            plugin_dir,
        }
    }
}

/// Per-host context shared with every plugin.
pub struct PluginContext {
    services: Mutex<HashMap<String, ServiceRef>>,
    events: EventBus,
    paths: ContextPaths,
    host_version: String,
}

impl PluginContext {
    /// Create a context for the given host version and directories.
    pub fn new(host_version: impl Into<String>, paths: ContextPaths) -> Self {
        Self {
            services: Mutex::new(HashMap::new()),
            events: EventBus::new(),
            paths,
            host_version: host_version.into(),
        }
    }

    // ------------------------------------------------------------------
    // Service registry
    // ------------------------------------------------------------------

    /// Register a service under a name. Registering an already-used name
    /// silently overwrites it: the most recently loaded provider wins.
    pub fn register_service(&self, name: impl Into<String>, service: ServiceRef) {
        self.services.lock().insert(name.into(), service);
    }

    /// Remove a service registration. Returns `false` if the name was
    /// not registered.
    pub fn unregister_service(&self, name: &str) -> bool {
        self.services.lock().remove(name).is_some()
    }

    /// Whether a live service is registered under the name.
    pub fn has_service(&self, name: &str) -> bool {
        self.services
            .lock()
            .get(name)
            .is_some_and(|s| s.strong_count() > 0)
    }

    /// Look up a service by name. Returns `None` for unknown names and
    /// for registrations whose object has already been dropped.
    pub fn get_service(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.services.lock().get(name).and_then(Weak::upgrade)
    }

    // ------------------------------------------------------------------
    // Event bus
    // ------------------------------------------------------------------

    /// Subscribe a callback to an event name. Returns a monotonic,
    /// never-reused subscription id.
    pub fn subscribe<F>(&self, event: impl Into<String>, callback: F) -> u64
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.events.subscribe(event, callback)
    }

    /// Remove a subscription by id.
    pub fn unsubscribe(&self, id: u64) -> bool {
        self.events.unsubscribe(id)
    }

    /// Publish an event to all current subscribers of its name. Returns
    /// the number of callbacks invoked.
    pub fn publish(&self, event: &str, payload: &Value) -> usize {
        self.events.publish(event, payload)
    }

    /// Number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.events.subscription_count()
    }

    // ------------------------------------------------------------------
    // Paths and host identity
    // ------------------------------------------------------------------

    /// Host configuration directory.
    pub fn config_dir(&self) -> &Path {
        &self.paths.config_dir
    }

    /// Host data directory.
    pub fn data_dir(&self) -> &Path {
        &self.paths.data_dir
    }

    /// Plugin module directory.
    pub fn plugin_dir(&self) -> &Path {
        &self.paths.plugin_dir
    }

    /// Version string of the running host.
    pub fn host_version(&self) -> &str {
        &self.host_version
    }

    // ------------------------------------------------------------------
    // Logging sink
    // ------------------------------------------------------------------

    /// Log a message attributed to a plugin. Plugins use this instead of
    /// writing to shared output directly.
    pub fn log(&self, level: LogLevel, plugin_id: &str, message: &str) {
        match level {
            LogLevel::Debug => {
                tracing::debug!(target: "netpulse::plugin", plugin = plugin_id, "{}", message)
            }
            LogLevel::Info => {
                tracing::info!(target: "netpulse::plugin", plugin = plugin_id, "{}", message)
            }
            LogLevel::Warning => {
                tracing::warn!(target: "netpulse::plugin", plugin = plugin_id, "{}", message)
            }
            LogLevel::Error => {
                tracing::error!(target: "netpulse::plugin", plugin = plugin_id, "{}", message)
            }
        }
    }

    /// Log at debug level.
    pub fn log_debug(&self, plugin_id: &str, message: &str) {
        self.log(LogLevel::Debug, plugin_id, message);
    }

    /// Log at info level.
    pub fn log_info(&self, plugin_id: &str, message: &str) {
        self.log(LogLevel::Info, plugin_id, message);
    }

    /// Log at warning level.
    pub fn log_warning(&self, plugin_id: &str, message: &str) {
        self.log(LogLevel::Warning, plugin_id, message);
    }

    /// Log at error level.
    pub fn log_error(&self, plugin_id: &str, message: &str) {
        self.log(LogLevel::Error, plugin_id, message);
    }
}

impl Default for PluginContext {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"), ContextPaths::default())
    }
}
