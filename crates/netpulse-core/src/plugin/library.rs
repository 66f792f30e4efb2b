//! Owning wrappers around dynamic plugin modules and their instances.
//!
//! [`PluginModule`] pairs an opened [`Library`] with the two resolved
//! entry points. [`PluginHandle`] owns a constructed instance together
//! with the module it came from; its drop order is fixed — destroy the
//! instance through the module's destroyer entry point, then close the
//! module — because calling the destroyer after the module is closed is
//! undefined. The raw handle is never exposed outside these types.

use std::ops::Deref;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use libloading::Library;

use crate::plugin::{
    panic_message, Plugin, PluginCreateFn, PluginDestroyFn, PluginError, Result,
    PLUGIN_CREATE_SYMBOL, PLUGIN_DESTROY_SYMBOL,
};

/// An opened plugin module with its entry points resolved.
pub struct PluginModule {
    library: Library,
    create: PluginCreateFn,
    destroy: PluginDestroyFn,
}

impl PluginModule {
    /// Open a module file and resolve the factory and destroyer symbols.
    pub fn open(path: &Path) -> Result<Self> {
        let library = unsafe {
            Library::new(path).map_err(|e| PluginError::LoadFailed(e.to_string()))?
        };

        let create: PluginCreateFn = unsafe {
            *library.get(PLUGIN_CREATE_SYMBOL).map_err(|e| {
                PluginError::MissingEntryPoint(format!("netpulse_plugin_create: {}", e))
            })?
        };

        let destroy: PluginDestroyFn = unsafe {
            *library.get(PLUGIN_DESTROY_SYMBOL).map_err(|e| {
                PluginError::MissingEntryPoint(format!("netpulse_plugin_destroy: {}", e))
            })?
        };

        Ok(Self {
            library,
            create,
            destroy,
        })
    }

    /// Invoke the factory entry point and wrap the new instance.
    ///
    /// A panicking factory or a null return both fail with
    /// `ConstructionFailed`; in either case the module is closed when
    /// this value is dropped.
    pub fn instantiate(self) -> Result<PluginHandle> {
        let create = self.create;
        let instance = catch_unwind(AssertUnwindSafe(|| unsafe { create() }))
            .map_err(|panic| PluginError::ConstructionFailed(panic_message(panic)))?;

        if instance.is_null() {
            return Err(PluginError::ConstructionFailed(
                "factory entry point returned null".to_string(),
            ));
        }

        Ok(PluginHandle {
            instance,
            destroy: Some(self.destroy),
            library: Some(self.library),
        })
    }
}

/// Owning, shareable handle to a constructed plugin instance.
///
/// Handles are reference-counted via `Arc` by the manager; a caller that
/// obtained one through a query may keep using it after the manager
/// unloads the plugin. The instance is destroyed and the module closed
/// only when the last holder releases it.
pub struct PluginHandle {
    /// The constructed instance. Valid until drop.
    instance: *mut dyn Plugin,

    /// Destroyer entry point for module-built instances; `None` for
    /// in-process instances, which are released as ordinary boxes.
    destroy: Option<PluginDestroyFn>,

    /// The module that produced the instance, kept open while the
    /// instance lives. `None` for in-process instances.
    library: Option<Library>,
}

// SAFETY: the instance is only reachable as `&dyn Plugin`, and the
// Plugin trait requires Send + Sync of every implementation. Library is
// itself Send + Sync.
unsafe impl Send for PluginHandle {}
unsafe impl Sync for PluginHandle {}

impl PluginHandle {
    /// Wrap an in-process plugin instance that was not produced by a
    /// dynamic module (built-in plugins, tests).
    pub fn from_instance(plugin: Box<dyn Plugin>) -> Self {
        Self {
            instance: Box::into_raw(plugin),
            destroy: None,
            library: None,
        }
    }

    /// Whether this handle keeps a dynamic module open.
    pub fn owns_library(&self) -> bool {
        self.library.is_some()
    }

    /// Borrow the plugin instance.
    pub fn plugin(&self) -> &(dyn Plugin + 'static) {
        // SAFETY: instance is non-null and valid for the handle's lifetime.
        unsafe { &*self.instance }
    }
}

impl Deref for PluginHandle {
    type Target = dyn Plugin;

    fn deref(&self) -> &Self::Target {
        self.plugin()
    }
}

impl Drop for PluginHandle {
    fn drop(&mut self) {
        match self.destroy {
            // Destroyer first, while the module is still open.
            Some(destroy) => unsafe { destroy(self.instance) },
            // In-process instance: release the box directly.
            None => unsafe {
                drop(Box::from_raw(self.instance));
            },
        }
        // Now the module may be closed.
        drop(self.library.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PluginContext;
    use crate::plugin::{LifecycleState, PluginKind, PluginMetadata};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct DropCounter {
        drops: Arc<AtomicUsize>,
    }

    impl Plugin for DropCounter {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new("drop-counter", "Drop Counter", "1.0.0", PluginKind::Widget)
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

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_in_process_handle_releases_instance_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let handle = PluginHandle::from_instance(Box::new(DropCounter {
            drops: Arc::clone(&drops),
        }));

        assert!(!handle.owns_library());
        assert_eq!(handle.metadata().id, "drop-counter");

        let shared = Arc::new(handle);
        let extra = Arc::clone(&shared);
        drop(shared);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(extra);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_open_missing_module_fails() {
        let err = PluginModule::open(Path::new("/nonexistent/plugin.so"))
            .err()
            .unwrap();
        assert!(matches!(err, PluginError::LoadFailed(_)));
    }
}
