//! Plugin host subsystem for NetPulse.
//!
//! This module discovers, loads, version-checks, initializes, and tears
//! down externally built extension modules at runtime:
//!
//! - [`contract`] — the [`Plugin`] trait every extension implements plus
//!   the optional capability interfaces and the dynamic-module ABI macro.
//! - [`types`] — metadata, kinds, dependencies, and lifecycle state.
//! - [`manifest`] — sidecar manifest files and platform module extensions.
//! - [`library`] — the owning wrapper around a dynamic module handle.
//! - [`manager`] — the [`PluginManager`] driving the whole lifecycle.
//!
//! Extension faults (panics raised inside plugin-authored code) are caught
//! at this boundary and converted to [`PluginError`]; they never unwind
//! into the host.

use std::path::PathBuf;

pub mod contract;
pub mod library;
pub mod manager;
pub mod manifest;
pub mod types;

pub use contract::{
    DataExporter, DataProcessor, MonitorCallback, MonitorResult, NetworkMonitor,
    NotificationHandler, Plugin, PluginCreateFn, PluginDestroyFn, ProcessedData,
    PLUGIN_CREATE_SYMBOL, PLUGIN_DESTROY_SYMBOL,
};
pub use library::{PluginHandle, PluginModule};
pub use manager::{LoadedPlugin, PluginManager};
pub use manifest::{is_plugin_module, manifest_path_for, module_extension, PluginManifest};
pub use types::{CapabilityInfo, LifecycleState, PluginDependency, PluginKind, PluginMetadata};

/// Result type for plugin operations.
pub type Result<T> = std::result::Result<T, PluginError>;

/// Plugin error taxonomy.
///
/// All of these are non-fatal to the host process: each aborts at most
/// the one operation that raised it.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The module path does not exist.
    #[error("plugin module not found: {0:?}")]
    ModuleNotFound(PathBuf),

    /// The platform loader rejected the module.
    #[error("failed to load plugin module: {0}")]
    LoadFailed(String),

    /// A required entry point symbol is missing from the module.
    #[error("missing plugin entry point: {0}")]
    MissingEntryPoint(String),

    /// The factory entry point panicked or returned null.
    #[error("plugin construction failed: {0}")]
    ConstructionFailed(String),

    /// Host version or a required dependency is incompatible.
    #[error("unsatisfied plugin dependency: {0}")]
    DependencyUnsatisfied(String),

    /// A plugin with the same id is already loaded.
    #[error("plugin id already loaded: {0}")]
    DuplicateId(String),

    /// `initialize` panicked or returned `false`.
    #[error("plugin initialization failed: {0}")]
    InitializationFailed(String),

    /// No plugin with the given id is loaded.
    #[error("plugin not found: {0}")]
    NotFound(String),

    /// A sidecar manifest could not be parsed.
    #[error("invalid plugin manifest: {0}")]
    InvalidManifest(String),

    /// A plugin-authored operation failed.
    #[error("plugin execution failed: {0}")]
    ExecutionFailed(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("plugin error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Extract a printable message from a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
