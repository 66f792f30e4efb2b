//! Sidecar manifest files describing plugin modules before loading.
//!
//! A module `foo.so` (or `.dylib`/`.dll`) is described by `foo.json` in
//! the same directory: the metadata fields plus an `enabled` flag and a
//! free-form `configuration` object.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugin::{PluginError, PluginMetadata, Result};

/// File extension of sidecar manifest files.
pub const MANIFEST_EXTENSION: &str = "json";

/// Dynamic-module file extension for the host platform.
pub fn module_extension() -> &'static str {
    match std::env::consts::OS {
        "macos" => "dylib",
        "windows" => "dll",
        _ => "so",
    }
}

/// Check whether a path looks like a loadable plugin module.
pub fn is_plugin_module(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(module_extension())
}

/// Sidecar manifest path for a module file.
pub fn manifest_path_for(module: &Path) -> PathBuf {
    module.with_extension(MANIFEST_EXTENSION)
}

fn default_enabled() -> bool {
    true
}

fn default_configuration() -> Value {
    Value::Object(Default::default())
}

/// Discovery-time descriptor pairing a module path with its manifest
/// contents. Ephemeral: not retained once a load decision is made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Path of the module this manifest describes.
    #[serde(skip, default)]
    pub module_path: PathBuf,

    /// Plugin metadata fields.
    #[serde(flatten)]
    pub metadata: PluginMetadata,

    /// Whether the plugin should be activated.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Initial configuration value.
    #[serde(default = "default_configuration")]
    pub configuration: Value,
}

impl PluginManifest {
    /// Read and parse the sidecar manifest for a module file.
    pub fn for_module(module: &Path) -> Result<Self> {
        let manifest_path = manifest_path_for(module);
        let text = std::fs::read_to_string(&manifest_path)?;
        let mut manifest: PluginManifest = serde_json::from_str(&text).map_err(|e| {
            PluginError::InvalidManifest(format!("{}: {}", manifest_path.display(), e))
        })?;
        manifest.module_path = module.to_path_buf();
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginKind;

    const MANIFEST: &str = r#"{
        "id": "com.netpulse.latency",
        "name": "Latency Tagger",
        "version": "1.4.0",
        "author": "NetPulse Contributors",
        "description": "Tags slow ping results",
        "license": "Apache-2.0",
        "kind": 2,
        "capabilities": [
            {"name": "tagging", "version": "1.0.0"}
        ],
        "dependencies": [
            {"plugin_id": "com.netpulse.core-metrics", "min_version": "2.0.0"}
        ],
        "min_host_version": "0.3.0",
        "configuration": {"threshold_ms": 250}
    }"#;

    #[test]
    fn test_parse_full_manifest() {
        let manifest: PluginManifest = serde_json::from_str(MANIFEST).unwrap();
        assert_eq!(manifest.metadata.id, "com.netpulse.latency");
        assert_eq!(manifest.metadata.kind, PluginKind::DataProcessor);
        assert_eq!(manifest.metadata.capabilities.len(), 1);
        assert_eq!(manifest.metadata.dependencies[0].min_version, "2.0.0");
        assert!(manifest.metadata.dependencies[0].required);
        assert!(manifest.enabled);
        assert_eq!(manifest.configuration["threshold_ms"], 250);
    }

    #[test]
    fn test_minimal_manifest_defaults() {
        let manifest: PluginManifest = serde_json::from_str(
            r#"{"id": "p", "name": "P", "version": "1.0.0", "kind": 0}"#,
        )
        .unwrap();
        assert!(manifest.enabled);
        assert_eq!(manifest.configuration, serde_json::json!({}));
        assert_eq!(manifest.metadata.min_host_version, "0.0.0");
        assert!(manifest.metadata.dependencies.is_empty());
    }

    #[test]
    fn test_malformed_kind_is_rejected() {
        let result: std::result::Result<PluginManifest, _> = serde_json::from_str(
            r#"{"id": "p", "name": "P", "version": "1.0.0", "kind": 42}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_manifest_path_substitutes_module_extension() {
        let module = PathBuf::from("/plugins/libfoo.so");
        assert_eq!(
            manifest_path_for(&module),
            PathBuf::from("/plugins/libfoo.json")
        );
    }

    #[test]
    fn test_for_module_missing_file() {
        let err = PluginManifest::for_module(Path::new("/nonexistent/mod.so")).unwrap_err();
        assert!(matches!(err, PluginError::Io(_)));
    }
}
