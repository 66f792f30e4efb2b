//! The extension contract: the base [`Plugin`] trait, the optional
//! capability interfaces, and the dynamic-module ABI.
//!
//! Every extension module implements [`Plugin`] and may additionally
//! implement any number of the capability traits. The manager queries
//! capabilities at runtime through the `as_*` accessors; the capability
//! strings in [`PluginMetadata`](crate::plugin::PluginMetadata) are
//! advisory and used for display only.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::PluginContext;
use crate::plugin::{LifecycleState, PluginMetadata, Result};

/// Fixed symbol name of the factory entry point every module exports.
pub const PLUGIN_CREATE_SYMBOL: &[u8] = b"netpulse_plugin_create";

/// Fixed symbol name of the destroyer entry point every module exports.
pub const PLUGIN_DESTROY_SYMBOL: &[u8] = b"netpulse_plugin_destroy";

/// Type of the factory entry point: zero arguments, returns the new
/// plugin instance (null on failure).
pub type PluginCreateFn = unsafe extern "C" fn() -> *mut dyn Plugin;

/// Type of the destroyer entry point: consumes an instance produced by
/// the paired factory.
pub type PluginDestroyFn = unsafe extern "C" fn(*mut dyn Plugin);

/// Base contract implemented by every extension.
///
/// All methods take `&self`: instances are shared behind `Arc` and must
/// be callable from any thread, so implementations use interior
/// mutability for their state. Only the plugin's own code advances the
/// value reported by [`state`](Plugin::state); the manager reads it to
/// decide whether `initialize` or `shutdown` is needed.
pub trait Plugin: Send + Sync {
    /// Identity and compatibility descriptor.
    fn metadata(&self) -> PluginMetadata;

    /// Current lifecycle state.
    fn state(&self) -> LifecycleState;

    /// Initialize with the shared host context.
    ///
    /// On success the plugin ends in [`LifecycleState::Running`] and
    /// returns `true`. On failure it returns `false` (or panics, which
    /// the manager catches) without advancing its observable state past
    /// `Loaded`.
    fn initialize(&self, context: Arc<PluginContext>) -> bool;

    /// Release resources and stop all work. Idempotent: calling it on
    /// an already stopped plugin is a no-op.
    fn shutdown(&self);

    /// Apply a configuration value. Returns `false` if the value was
    /// rejected.
    fn configure(&self, config: &Value) -> bool {
        let _ = config;
        true
    }

    /// Current configuration.
    fn configuration(&self) -> Value {
        Value::Object(Default::default())
    }

    /// Default configuration, used before any `configure` call.
    fn default_configuration(&self) -> Value {
        Value::Object(Default::default())
    }

    /// Whether the plugin considers itself healthy.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Short human-readable status line.
    fn status_message(&self) -> String {
        String::new()
    }

    /// Structured diagnostic information.
    fn diagnostics(&self) -> Value {
        Value::Object(Default::default())
    }

    /// Soft-resume the plugin. Independent of lifecycle state; the
    /// plugin itself checks [`is_enabled`](Plugin::is_enabled) before
    /// doing work.
    fn enable(&self);

    /// Soft-pause the plugin without shutting it down.
    fn disable(&self);

    /// Whether the plugin is currently enabled.
    fn is_enabled(&self) -> bool;

    /// Downcast to the data-processor capability, if implemented.
    fn as_data_processor(&self) -> Option<&dyn DataProcessor> {
        None
    }

    /// Downcast to the network-monitor capability, if implemented.
    fn as_network_monitor(&self) -> Option<&dyn NetworkMonitor> {
        None
    }

    /// Downcast to the notification-handler capability, if implemented.
    fn as_notification_handler(&self) -> Option<&dyn NotificationHandler> {
        None
    }

    /// Downcast to the data-exporter capability, if implemented.
    fn as_data_exporter(&self) -> Option<&dyn DataExporter> {
        None
    }
}

/// Result of processing one piece of monitoring data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedData {
    /// Data-type tag the input carried.
    pub data_type: String,

    /// The input value, unchanged.
    pub original: Value,

    /// The processor's enriched output.
    pub enriched: Value,

    /// Labels the processor attached.
    pub tags: Vec<String>,

    /// When processing happened.
    pub timestamp: DateTime<Utc>,
}

/// Capability: enriches or transforms monitoring data.
pub trait DataProcessor: Send + Sync {
    /// Data-type tags this processor accepts.
    fn supported_data_types(&self) -> Vec<String>;

    /// Whether a given tag can be processed.
    fn can_process(&self, data_type: &str) -> bool {
        self.supported_data_types().iter().any(|t| t == data_type)
    }

    /// Process one value.
    fn process(&self, data_type: &str, data: &Value) -> ProcessedData;

    /// Hook fired when the host observes a ping result.
    fn on_ping_result(&self, result: &Value) {
        let _ = result;
    }

    /// Hook fired when the host raises an alert.
    fn on_alert(&self, alert: &Value) {
        let _ = alert;
    }

    /// Hook fired when a network scan completes.
    fn on_scan_complete(&self, scan: &Value) {
        let _ = scan;
    }
}

/// Outcome of a single monitoring check, delivered through a
/// [`MonitorCallback`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorResult {
    /// The checked target.
    pub target: String,

    /// Whether the check succeeded.
    pub success: bool,

    /// Round-trip latency, if measured.
    pub latency_ms: Option<f64>,

    /// Free-form detail message.
    pub message: String,

    /// When the check finished.
    pub timestamp: DateTime<Utc>,
}

/// Callback through which a network monitor delivers check results.
pub type MonitorCallback = Arc<dyn Fn(MonitorResult) + Send + Sync>;

/// Capability: performs active checks against network targets.
///
/// Asynchronous checks are mediated through the result callback owned by
/// the plugin; the manager never waits on them.
pub trait NetworkMonitor: Send + Sync {
    /// Monitor type identifier (for example `"ping"` or `"snmp"`).
    fn monitor_type(&self) -> String;

    /// Whether this monitor can check the given address.
    fn supports_address(&self, address: &str) -> bool;

    /// Begin continuous monitoring of a target. Returns `false` if the
    /// target was rejected.
    fn start_monitoring(&self, target: &str, callback: MonitorCallback) -> bool;

    /// Stop continuous monitoring of a target.
    fn stop_monitoring(&self, target: &str);

    /// Run a single check with a time budget, delivering the outcome
    /// through the callback.
    fn check(&self, target: &str, timeout: Duration, callback: MonitorCallback);
}

/// Capability: delivers alert notifications through an external channel.
pub trait NotificationHandler: Send + Sync {
    /// Notification type identifier (for example `"webhook"`).
    fn notification_type(&self) -> String;

    /// JSON schema describing the channel configuration.
    fn config_schema(&self) -> Value;

    /// Deliver a notification payload.
    fn send(&self, payload: &Value) -> Result<()>;

    /// Verify that the channel is reachable.
    fn test_connection(&self) -> bool;

    /// Render an event into the channel's message format.
    fn format_payload(&self, event: &Value) -> String;
}

/// Capability: exports monitoring data to external formats or systems.
pub trait DataExporter: Send + Sync {
    /// Exporter type identifier (for example `"csv"`).
    fn exporter_type(&self) -> String;

    /// Formats this exporter can produce.
    fn supported_formats(&self) -> Vec<String>;

    /// Export data in the given format.
    fn export_data(&self, data: &Value, format: &str) -> Result<Vec<u8>>;

    /// Export data in the given format directly to a file.
    fn export_to_file(&self, data: &Value, format: &str, path: &Path) -> Result<()>;

    /// Verify that the export destination is reachable.
    fn test_connection(&self) -> bool {
        true
    }
}

/// Export the two entry points a dynamic plugin module must provide.
///
/// # Usage
/// ```ignore
/// use netpulse_core::declare_plugin;
///
/// struct MyPlugin { /* ... */ }
///
/// impl netpulse_core::plugin::Plugin for MyPlugin {
///     // ...
/// }
///
/// declare_plugin!(MyPlugin, MyPlugin::new);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($plugin_type:ty, $constructor:path) => {
        // Panics must not reach the extern "C" boundary: unwinding
        // through it aborts the process. A panicking constructor
        // degrades to a null return, which the host maps to a
        // construction failure; a panicking drop is swallowed so
        // teardown of the remaining plugins proceeds.
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn netpulse_plugin_create() -> *mut dyn $crate::plugin::Plugin {
            let constructor: fn() -> $plugin_type = $constructor;
            match ::std::panic::catch_unwind(|| {
                let boxed: Box<dyn $crate::plugin::Plugin> = Box::new(constructor());
                Box::into_raw(boxed)
            }) {
                Ok(instance) => instance,
                Err(_) => {
                    ::std::ptr::null_mut::<$plugin_type>() as *mut dyn $crate::plugin::Plugin
                }
            }
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn netpulse_plugin_destroy(instance: *mut dyn $crate::plugin::Plugin) {
            if instance.is_null() {
                return;
            }
            let _ = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| unsafe {
                drop(Box::from_raw(instance));
            }));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PluginError, PluginKind};
    use serde_json::json;

    struct PanickyPlugin;

    impl Plugin for PanickyPlugin {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new("panicky", "Panicky", "1.0.0", PluginKind::Widget)
        }

        fn state(&self) -> LifecycleState {
            LifecycleState::Loaded
        }

        fn initialize(&self, _context: Arc<PluginContext>) -> bool {
            true
        }

        fn shutdown(&self) {}

        fn enable(&self) {}

        fn disable(&self) {}

        fn is_enabled(&self) -> bool {
            true
        }
    }

    fn build_panicky() -> PanickyPlugin {
        panic!("constructor fault")
    }

    crate::declare_plugin!(PanickyPlugin, build_panicky);

    #[test]
    fn test_panicking_constructor_degrades_to_null() {
        // The entry point must contain the fault itself: unwinding
        // through extern "C" would abort the process.
        let instance = netpulse_plugin_create();
        assert!(instance.is_null());

        // Destroying a null instance is a no-op.
        netpulse_plugin_destroy(instance);
    }

    struct Webhook;

    impl NotificationHandler for Webhook {
        fn notification_type(&self) -> String {
            "webhook".to_string()
        }

        fn config_schema(&self) -> Value {
            json!({"url": "string"})
        }

        fn send(&self, payload: &Value) -> Result<()> {
            if payload.get("url").is_none() {
                return Err(PluginError::ExecutionFailed("missing url".to_string()));
            }
            Ok(())
        }

        fn test_connection(&self) -> bool {
            false
        }

        fn format_payload(&self, event: &Value) -> String {
            event.to_string()
        }
    }

    #[test]
    fn test_handler_failures_use_the_plugin_taxonomy() {
        let handler = Webhook;
        let err = handler.send(&json!({})).err().unwrap();
        assert!(matches!(err, PluginError::ExecutionFailed(_)));
        assert!(handler.send(&json!({"url": "http://example"})).is_ok());

        // Handlers built on anyhow-based clients convert with `?`.
        let err: PluginError = anyhow::anyhow!("backend offline").into();
        assert!(matches!(err, PluginError::Other(_)));
    }

    struct TagProcessor;

    impl DataProcessor for TagProcessor {
        fn supported_data_types(&self) -> Vec<String> {
            vec!["ping".to_string(), "scan".to_string()]
        }

        fn process(&self, data_type: &str, data: &Value) -> ProcessedData {
            ProcessedData {
                data_type: data_type.to_string(),
                original: data.clone(),
                enriched: data.clone(),
                tags: vec!["test".to_string()],
                timestamp: Utc::now(),
            }
        }
    }

    #[test]
    fn test_can_process_default_is_membership() {
        let p = TagProcessor;
        assert!(p.can_process("ping"));
        assert!(p.can_process("scan"));
        assert!(!p.can_process("alert"));
    }

    #[test]
    fn test_processed_data_serializes() {
        let p = TagProcessor;
        let out = p.process("ping", &serde_json::json!({"host_id": 1}));
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["data_type"], "ping");
        assert_eq!(json["tags"][0], "test");
    }
}
