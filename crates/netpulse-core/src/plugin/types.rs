//! Plugin type definitions: metadata, kinds, dependencies, and lifecycle state.

use serde::{Deserialize, Serialize};

/// Kind of functionality a plugin primarily provides.
///
/// Serialized as the integer code used by sidecar manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PluginKind {
    /// Performs active checks against network targets.
    NetworkMonitor,
    /// Delivers alert notifications through an external channel.
    NotificationHandler,
    /// Enriches or transforms monitoring data.
    DataProcessor,
    /// Exports monitoring data to external formats or systems.
    DataExporter,
    /// Provides an alternative storage backend.
    StorageBackend,
    /// Contributes a dashboard widget.
    Widget,
}

impl PluginKind {
    /// String representation used in logs and queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginKind::NetworkMonitor => "network_monitor",
            PluginKind::NotificationHandler => "notification_handler",
            PluginKind::DataProcessor => "data_processor",
            PluginKind::DataExporter => "data_exporter",
            PluginKind::StorageBackend => "storage_backend",
            PluginKind::Widget => "widget",
        }
    }

    /// The integer code used in manifest files.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl From<PluginKind> for u8 {
    fn from(kind: PluginKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for PluginKind {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(PluginKind::NetworkMonitor),
            1 => Ok(PluginKind::NotificationHandler),
            2 => Ok(PluginKind::DataProcessor),
            3 => Ok(PluginKind::DataExporter),
            4 => Ok(PluginKind::StorageBackend),
            5 => Ok(PluginKind::Widget),
            other => Err(format!("unknown plugin kind code: {}", other)),
        }
    }
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An advertised sub-feature of a plugin.
///
/// Capability entries are advisory and used for display only; whether a
/// plugin actually implements a capability interface is determined at
/// runtime through the `as_*` accessors on [`crate::plugin::Plugin`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityInfo {
    /// Capability name.
    pub name: String,

    /// Capability version.
    pub version: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

/// A declared dependency on another plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDependency {
    /// Id of the plugin that is depended upon.
    pub plugin_id: String,

    /// Minimum acceptable version (`MAJOR.MINOR.PATCH`).
    pub min_version: String,

    /// Whether the dependency must be present for the dependent to load.
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

fn default_min_host_version() -> String {
    "0.0.0".to_string()
}

/// Identity and compatibility descriptor for a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Globally unique plugin identifier. Immutable once constructed;
    /// always the lookup key, never `full_id()`.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Plugin version (`MAJOR.MINOR.PATCH`).
    pub version: String,

    /// Author.
    #[serde(default)]
    pub author: String,

    /// Description.
    #[serde(default)]
    pub description: String,

    /// License identifier.
    #[serde(default)]
    pub license: String,

    /// Primary kind of the plugin.
    pub kind: PluginKind,

    /// Advertised sub-features (display only).
    #[serde(default)]
    pub capabilities: Vec<CapabilityInfo>,

    /// Declared dependencies on other plugins.
    #[serde(default)]
    pub dependencies: Vec<PluginDependency>,

    /// Minimum host version this plugin requires.
    #[serde(default = "default_min_host_version")]
    pub min_host_version: String,
}

impl PluginMetadata {
    /// Create new plugin metadata.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        kind: PluginKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            author: String::new(),
            description: String::new(),
            license: String::new(),
            kind,
            capabilities: Vec::new(),
            dependencies: Vec::new(),
            min_host_version: default_min_host_version(),
        }
    }

    /// Set the author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the license.
    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.license = license.into();
        self
    }

    /// Set the minimum host version.
    pub fn with_min_host_version(mut self, version: impl Into<String>) -> Self {
        self.min_host_version = version.into();
        self
    }

    /// Add an advertised capability.
    pub fn with_capability(mut self, capability: CapabilityInfo) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Add a dependency declaration.
    pub fn with_dependency(mut self, dependency: PluginDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Combined `id@version` string for display and log correlation.
    ///
    /// Never used as a lookup key: only one version of a given id may be
    /// loaded at a time, so lookup is always by bare id.
    pub fn full_id(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }
}

/// Lifecycle state of a plugin instance.
///
/// States form the total order `Unloaded < Loaded < Initialized < Running
/// < Stopped`; `Error` is terminal and reachable from any of them. Only
/// the plugin's own code advances its published state; the manager reads
/// it to decide whether to call `initialize` or `shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No instance exists (also reported for unknown ids).
    Unloaded,
    /// The module factory produced an instance.
    Loaded,
    /// `initialize` has begun setting up the plugin.
    Initialized,
    /// The plugin is fully operational.
    Running,
    /// The plugin has been shut down.
    Stopped,
    /// Terminal fault state; the plugin is excluded from dispatch.
    Error,
}

impl LifecycleState {
    /// Check whether the plugin has been initialized (or beyond).
    pub fn is_initialized(&self) -> bool {
        matches!(
            self,
            LifecycleState::Initialized | LifecycleState::Running | LifecycleState::Stopped
        )
    }

    /// Check whether the plugin is actively usable.
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Initialized | LifecycleState::Running)
    }

    /// Check whether this is the terminal fault state.
    pub fn is_error(&self) -> bool {
        matches!(self, LifecycleState::Error)
    }

    /// String representation for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Unloaded => "unloaded",
            LifecycleState::Loaded => "loaded",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Error => "error",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_round_trip() {
        for code in 0u8..6 {
            let kind = PluginKind::try_from(code).unwrap();
            assert_eq!(kind.code(), code);
        }
        assert!(PluginKind::try_from(6).is_err());
    }

    #[test]
    fn test_kind_serializes_as_integer() {
        let json = serde_json::to_string(&PluginKind::DataProcessor).unwrap();
        assert_eq!(json, "2");
        let kind: PluginKind = serde_json::from_str("0").unwrap();
        assert_eq!(kind, PluginKind::NetworkMonitor);
    }

    #[test]
    fn test_full_id_format() {
        let meta = PluginMetadata::new("com.x.a", "A", "1.2.3", PluginKind::DataProcessor);
        assert_eq!(meta.full_id(), "com.x.a@1.2.3");
    }

    #[test]
    fn test_state_total_order() {
        assert!(LifecycleState::Unloaded < LifecycleState::Loaded);
        assert!(LifecycleState::Loaded < LifecycleState::Initialized);
        assert!(LifecycleState::Initialized < LifecycleState::Running);
        assert!(LifecycleState::Running < LifecycleState::Stopped);
    }

    #[test]
    fn test_state_predicates() {
        assert!(LifecycleState::Running.is_active());
        assert!(!LifecycleState::Stopped.is_active());
        assert!(LifecycleState::Error.is_error());
    }

    #[test]
    fn test_dependency_required_defaults_true() {
        let dep: PluginDependency =
            serde_json::from_str(r#"{"plugin_id": "core", "min_version": "1.0.0"}"#).unwrap();
        assert!(dep.required);
    }

    #[test]
    fn test_metadata_builders() {
        let meta = PluginMetadata::new("p", "P", "1.0.0", PluginKind::DataExporter)
            .with_author("NetPulse Contributors")
            .with_min_host_version("2.0.0")
            .with_dependency(PluginDependency {
                plugin_id: "core".into(),
                min_version: "1.0.0".into(),
                required: true,
            });
        assert_eq!(meta.min_host_version, "2.0.0");
        assert_eq!(meta.dependencies.len(), 1);
    }
}
