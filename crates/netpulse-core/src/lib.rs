//! NetPulse plugin host subsystem.
//!
//! This crate lets a monitoring host discover, load, version-check,
//! initialize, and tear down externally built extension modules at
//! runtime, and gives those extensions a controlled window onto the
//! host: a service registry, an event bus, standard paths, and a
//! logging sink.
//!
//! # Architecture
//!
//! - [`plugin`] — the extension contract, dynamic-module ABI, sidecar
//!   manifests, and the [`PluginManager`](plugin::PluginManager).
//! - [`context`] — the per-host [`PluginContext`](context::PluginContext)
//!   shared with every plugin at initialization.
//! - [`version`] — lenient semantic-version compatibility checks.
//!
//! # Example
//!
//! ```no_run
//! use netpulse_core::plugin::PluginManager;
//!
//! let manager = PluginManager::new("0.3.0");
//! for manifest in manager.discover_plugins(manager.context().plugin_dir()) {
//!     if manifest.enabled {
//!         let _ = manager.load_plugin(&manifest.module_path);
//!     }
//! }
//! manager.initialize_all();
//! ```

pub mod context;
pub mod plugin;
pub mod version;

pub use context::{ContextPaths, LogLevel, PluginContext, ServiceRef};
pub use plugin::{
    LifecycleState, Plugin, PluginError, PluginKind, PluginManager, PluginMetadata,
};
pub use version::{is_version_compatible, parse_version};

/// Common imports for plugin authors and hosts.
pub mod prelude {
    pub use crate::context::{event_names, ContextPaths, LogLevel, PluginContext};
    pub use crate::plugin::{
        CapabilityInfo, DataExporter, DataProcessor, LifecycleState, MonitorCallback,
        MonitorResult, NetworkMonitor, NotificationHandler, Plugin, PluginDependency,
        PluginError, PluginHandle, PluginKind, PluginManager, PluginManifest, PluginMetadata,
        ProcessedData,
    };
    pub use crate::version::is_version_compatible;
}
