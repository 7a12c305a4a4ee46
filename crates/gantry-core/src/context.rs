//! Loading context: lazy, memoized module resolution for one configuration generation.
//!
//! A [`Context`] owns every module instance created while applying one
//! [`ConfigTree`]. Modules are loaded by path on demand; a module's
//! [`Provision`](crate::module::Provision) capability receives the same
//! context and loads its own dependencies through it, so the order in which
//! instances are acquired is a valid dependency order. Releasing the context
//! runs every [`Cleanup`](crate::module::Cleanup) in reverse of that order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{
    CleanupError, InvalidTransition, LoadError, LoadResult, StartError, StopError,
};
use crate::module::{Module, ModuleRef};
use crate::path::ModulePath;
use crate::registry::ModuleRegistry;
use crate::state::ModuleState;
use crate::tree::ConfigTree;

// =============================================================================
// LoadedModule
// =============================================================================

/// A module instance owned by a [`Context`], together with its lifecycle state.
pub struct LoadedModule {
    path: ModulePath,
    type_id: &'static str,
    module: Arc<dyn Module>,
    state: Mutex<ModuleState>,
}

impl LoadedModule {
    /// Path the instance was loaded from.
    pub fn path(&self) -> &ModulePath {
        &self.path
    }

    /// Registered type id of the instance.
    pub fn type_id(&self) -> &'static str {
        self.type_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ModuleState {
        *self.state.lock()
    }

    /// The instance.
    pub fn module(&self) -> &Arc<dyn Module> {
        &self.module
    }

    /// A non-owning handle to the instance.
    pub fn handle(&self) -> ModuleRef {
        ModuleRef::new(self.path.clone(), &self.module)
    }

    /// Starts the instance. Only allowed from [`ModuleState::Provisioned`].
    ///
    /// On failure the instance stays `Provisioned`.
    pub async fn start(&self) -> Result<(), StartError> {
        let state = self.state();
        if !state.can_start() {
            return Err(StartError {
                path: self.path.clone(),
                source: Box::new(InvalidTransition {
                    action: "start",
                    state,
                }),
            });
        }

        self.module.start().await.map_err(|source| StartError {
            path: self.path.clone(),
            source,
        })?;
        *self.state.lock() = ModuleState::Running;
        debug!(path = %self.path, type_id = self.type_id, "Module started");
        Ok(())
    }

    /// Stops the instance if it is running; otherwise does nothing.
    ///
    /// The instance is `Stopped` afterwards even if its `stop` reported an error.
    pub async fn stop(&self) -> Result<(), StopError> {
        if !self.state().can_stop() {
            trace!(path = %self.path, state = %self.state(), "Stop skipped");
            return Ok(());
        }

        let result = self.module.stop().await;
        *self.state.lock() = ModuleState::Stopped;
        match result {
            Ok(()) => {
                debug!(path = %self.path, type_id = self.type_id, "Module stopped");
                Ok(())
            }
            Err(source) => Err(StopError {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("path", &self.path)
            .field("type_id", &self.type_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Context
// =============================================================================

/// Per-generation module container.
///
/// Loading the same path twice returns the same instance. A path requested
/// while it is still being provisioned fails with [`LoadError::Cycle`].
pub struct Context {
    registry: Arc<ModuleRegistry>,
    tree: ConfigTree,
    entries: Vec<Arc<LoadedModule>>,
    index: HashMap<ModulePath, usize>,
    resolving: Vec<ModulePath>,
    released: AtomicBool,
}

impl Context {
    /// Creates an empty context for `tree`.
    pub fn new(registry: Arc<ModuleRegistry>, tree: ConfigTree) -> Self {
        Self {
            registry,
            tree,
            entries: Vec::new(),
            index: HashMap::new(),
            resolving: Vec::new(),
            released: AtomicBool::new(false),
        }
    }

    /// The configuration tree this context resolves paths against.
    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    /// The registry used to instantiate modules.
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Loads the module configured at `path`.
    pub fn load(&mut self, path: impl Into<ModulePath>) -> BoxFuture<'_, LoadResult<ModuleRef>> {
        let path = path.into();
        Box::pin(async move {
            let entry = self.load_entry(path, None).await?;
            Ok(entry.handle())
        })
    }

    /// Loads a module from an explicit payload, addressed as `path`.
    ///
    /// Used for payloads that are not stored in the tree verbatim, such as
    /// elements of a list of handlers. If `path` is already loaded the cached
    /// instance is returned and `raw` is ignored.
    pub fn load_with(
        &mut self,
        path: impl Into<ModulePath>,
        raw: Value,
    ) -> BoxFuture<'_, LoadResult<ModuleRef>> {
        let path = path.into();
        Box::pin(async move {
            let entry = self.load_entry(path, Some(raw)).await?;
            Ok(entry.handle())
        })
    }

    /// Loads a module and returns the owned entry rather than a handle.
    ///
    /// When `raw` is `None` the payload is read from the tree.
    pub fn load_entry(
        &mut self,
        path: ModulePath,
        raw: Option<Value>,
    ) -> BoxFuture<'_, LoadResult<Arc<LoadedModule>>> {
        Box::pin(async move {
            if let Some(pos) = self.resolving.iter().position(|p| *p == path) {
                let mut chain = self.resolving[pos..].to_vec();
                chain.push(path.clone());
                return Err(LoadError::Cycle { path, chain });
            }
            if let Some(&i) = self.index.get(&path) {
                trace!(%path, "Module served from context");
                return Ok(Arc::clone(&self.entries[i]));
            }

            let raw = match raw {
                Some(raw) => raw,
                None => self
                    .tree
                    .get(&path)
                    .cloned()
                    .ok_or_else(|| LoadError::NotConfigured { path: path.clone() })?,
            };
            let type_id = path.module_id(&raw);
            let descriptor = match self.registry.lookup(&type_id) {
                Ok(descriptor) => *descriptor,
                Err(_) => return Err(LoadError::UnknownType { path, type_id }),
            };
            let mut instance = match descriptor.instantiate(&raw) {
                Ok(instance) => instance,
                Err(source) => {
                    return Err(LoadError::Decode {
                        path,
                        type_id,
                        source,
                    });
                }
            };

            if let Some(validator) = instance.as_validator()
                && let Err(source) = validator.validate()
            {
                return Err(LoadError::Validation { path, source });
            }

            self.resolving.push(path.clone());
            let provisioned = match instance.as_provisioner() {
                Some(provisioner) => provisioner.provision(self).await,
                None => Ok(()),
            };
            self.resolving.pop();

            if let Err(source) = provisioned {
                if let Some(cleanup) = instance.as_cleanup()
                    && let Err(err) = cleanup.cleanup().await
                {
                    warn!(%path, error = %err, "Cleanup after failed provisioning failed");
                }
                // Dependency failures keep their own kind and path.
                return Err(match source.downcast::<LoadError>() {
                    Ok(nested) => *nested,
                    Err(source) => LoadError::Provision { path, source },
                });
            }

            let entry = Arc::new(LoadedModule {
                path: path.clone(),
                type_id: descriptor.id(),
                module: Arc::from(instance),
                state: Mutex::new(ModuleState::Provisioned),
            });
            self.index.insert(path, self.entries.len());
            self.entries.push(Arc::clone(&entry));
            debug!(path = %entry.path, type_id = entry.type_id, "Module provisioned");
            Ok(entry)
        })
    }

    /// Returns the loaded entry at `path`, if any.
    pub fn get(&self, path: &str) -> Option<&Arc<LoadedModule>> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    /// Lifecycle state of the module at `path`; `Unloaded` if it was never loaded.
    pub fn state(&self, path: &str) -> ModuleState {
        self.get(path)
            .map_or(ModuleState::Unloaded, |entry| entry.state())
    }

    /// Loaded entries in acquisition order.
    pub fn entries(&self) -> &[Arc<LoadedModule>] {
        &self.entries
    }

    /// Number of loaded modules.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` once [`cleanup`](Self::cleanup) has run.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Runs every module's cleanup capability in reverse acquisition order.
    ///
    /// Every cleanup runs even if earlier ones fail; failures are collected
    /// into one [`CleanupError`]. Calling this more than once is a no-op.
    pub async fn cleanup(&self) -> Result<(), CleanupError> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut failures = Vec::new();
        for entry in self.entries.iter().rev() {
            let Some(cleanup) = entry.module.as_cleanup() else {
                continue;
            };
            match cleanup.cleanup().await {
                Ok(()) => trace!(path = %entry.path, "Module cleaned up"),
                Err(err) => {
                    warn!(path = %entry.path, error = %err, "Module cleanup failed");
                    failures.push((entry.path.clone(), err));
                }
            }
        }

        debug!(modules = self.entries.len(), failed = failures.len(), "Context released");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CleanupError { failures })
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("entries", &self.entries)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BoxError, RegistryResult};
    use crate::module::{Cleanup, Provision, Validate};
    use crate::registry::ModuleDescriptor;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tokio_test::{assert_err, assert_ok};

    static JOURNAL: StdMutex<Vec<String>> = StdMutex::new(Vec::new());

    fn record(tag: &str, event: &str) {
        JOURNAL.lock().unwrap().push(format!("{tag}:{event}"));
    }

    fn events(tag: &str) -> Vec<String> {
        let prefix = format!("{tag}:");
        JOURNAL
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// Test module whose behavior is driven by its payload.
    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Recorder {
        tag: String,
        needs: Vec<String>,
        invalid: bool,
        fail_provision: bool,
        fail_cleanup: bool,
        #[serde(skip)]
        deps: Vec<ModuleRef>,
    }

    #[async_trait]
    impl Module for Recorder {
        async fn start(&self) -> Result<(), BoxError> {
            record(&self.tag, "start");
            Ok(())
        }

        async fn stop(&self) -> Result<(), BoxError> {
            record(&self.tag, "stop");
            Ok(())
        }

        fn as_validator(&self) -> Option<&dyn Validate> {
            Some(self)
        }

        fn as_provisioner(&mut self) -> Option<&mut dyn Provision> {
            Some(self)
        }

        fn as_cleanup(&self) -> Option<&dyn Cleanup> {
            Some(self)
        }
    }

    impl Validate for Recorder {
        fn validate(&self) -> Result<(), BoxError> {
            if self.invalid {
                return Err("marked invalid".into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Provision for Recorder {
        async fn provision(&mut self, ctx: &mut Context) -> Result<(), BoxError> {
            for path in &self.needs {
                self.deps.push(ctx.load(path.as_str()).await?);
            }
            record(&self.tag, "provision");
            if self.fail_provision {
                return Err("provision refused".into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Cleanup for Recorder {
        async fn cleanup(&self) -> Result<(), BoxError> {
            record(&self.tag, "cleanup");
            if self.fail_cleanup {
                return Err(format!("{} cleanup failed", self.tag).into());
            }
            Ok(())
        }
    }

    fn register(registry: &mut ModuleRegistry) -> RegistryResult<()> {
        for id in ["a", "b", "c", "a.dep.recorder"] {
            registry.register(ModuleDescriptor::of::<Recorder>(id))?;
        }
        Ok(())
    }

    fn context(apps: serde_json::Value) -> Context {
        let registry = ModuleRegistry::with_packages(&[register]).unwrap().freeze();
        let tree = ConfigTree::from_value(json!({ "apps": apps })).unwrap();
        Context::new(registry, tree)
    }

    #[tokio::test]
    async fn test_load_is_memoized() {
        let mut ctx = context(json!({ "a": { "tag": "memo-a" } }));

        let first = assert_ok!(ctx.load("apps.a").await);
        let second = assert_ok!(ctx.load("apps.a").await);

        assert!(Arc::ptr_eq(
            &first.upgrade().unwrap(),
            &second.upgrade().unwrap()
        ));
        assert_eq!(events("memo-a"), ["provision"]);
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.state("apps.a"), ModuleState::Provisioned);
        assert_eq!(ctx.state("apps.b"), ModuleState::Unloaded);
    }

    #[tokio::test]
    async fn test_dependencies_acquired_first_and_cleaned_up_last() {
        let mut ctx = context(json!({
            "a": { "tag": "order-a", "needs": ["apps.b"] },
            "b": { "tag": "order-b", "needs": ["apps.c"] },
            "c": { "tag": "order-c" },
        }));

        let a = assert_ok!(ctx.load("apps.a").await);
        let paths: Vec<_> = ctx.entries().iter().map(|e| e.path().as_str()).collect();
        assert_eq!(paths, ["apps.c", "apps.b", "apps.a"]);

        let recorder = a.downcast::<Recorder>().unwrap();
        assert_eq!(recorder.deps[0].path().as_str(), "apps.b");

        assert_ok!(ctx.cleanup().await);
        let order: Vec<_> = JOURNAL
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("order-") && e.ends_with(":cleanup"))
            .cloned()
            .collect();
        assert_eq!(
            order,
            ["order-a:cleanup", "order-b:cleanup", "order-c:cleanup"]
        );
    }

    #[tokio::test]
    async fn test_cycle_is_detected() {
        let mut ctx = context(json!({
            "a": { "tag": "cycle-a", "needs": ["apps.b"] },
            "b": { "tag": "cycle-b", "needs": ["apps.a"] },
        }));

        let err = assert_err!(ctx.load("apps.a").await);
        let LoadError::Cycle { path, chain } = &err else {
            panic!("expected cycle, got {err}");
        };
        assert_eq!(path.as_str(), "apps.a");
        let chain: Vec<_> = chain.iter().map(ModulePath::as_str).collect();
        assert_eq!(chain, ["apps.a", "apps.b", "apps.a"]);
        assert_eq!(
            err.to_string(),
            "module dependency cycle: apps.a -> apps.b -> apps.a"
        );
        assert!(ctx.is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_skips_provision() {
        let mut ctx = context(json!({ "a": { "tag": "invalid-a", "invalid": true } }));

        let err = assert_err!(ctx.load("apps.a").await);
        assert!(matches!(err, LoadError::Validation { .. }));
        assert_eq!(err.path().as_str(), "apps.a");
        assert!(events("invalid-a").is_empty());
        assert!(ctx.is_empty());
    }

    #[tokio::test]
    async fn test_provision_failure_cleans_up_instance() {
        let mut ctx = context(json!({ "a": { "tag": "prov-a", "fail_provision": true } }));

        let err = assert_err!(ctx.load("apps.a").await);
        assert!(matches!(err, LoadError::Provision { .. }));
        assert_eq!(events("prov-a"), ["provision", "cleanup"]);
        assert!(ctx.is_empty());
    }

    #[tokio::test]
    async fn test_nested_failure_keeps_its_kind() {
        let mut ctx = context(json!({
            "a": { "tag": "nested-a", "needs": ["apps.a.dep"], "dep": { "module": "missing" } },
        }));

        let err = assert_err!(ctx.load("apps.a").await);
        match err {
            LoadError::UnknownType { path, type_id } => {
                assert_eq!(path.as_str(), "apps.a.dep");
                assert_eq!(type_id, "a.dep.missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_inline_module_key_selects_type() {
        let mut ctx = context(json!({
            "a": { "tag": "inline-a", "needs": ["apps.a.dep"], "dep": { "module": "recorder", "tag": "inline-dep" } },
        }));

        assert_ok!(ctx.load("apps.a").await);
        assert_eq!(ctx.get("apps.a.dep").unwrap().type_id(), "a.dep.recorder");
        assert_eq!(events("inline-dep"), ["provision"]);
    }

    #[tokio::test]
    async fn test_unknown_and_missing_paths() {
        let mut ctx = context(json!({ "zzz": {} }));

        let err = assert_err!(ctx.load("apps.zzz").await);
        assert!(matches!(err, LoadError::UnknownType { .. }));

        let err = assert_err!(ctx.load("apps.a").await);
        assert!(matches!(err, LoadError::NotConfigured { .. }));

        let err = assert_err!(ctx.load_with("apps.a", json!({ "invalid": "yes" })).await);
        assert!(matches!(err, LoadError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_cleanup_aggregates_failures_and_is_idempotent() {
        let mut ctx = context(json!({
            "a": { "tag": "agg-a", "fail_cleanup": true },
            "b": { "tag": "agg-b" },
            "c": { "tag": "agg-c", "fail_cleanup": true },
        }));
        for path in ["apps.a", "apps.b", "apps.c"] {
            assert_ok!(ctx.load(path).await);
        }

        let err = assert_err!(ctx.cleanup().await);
        let failed: Vec<_> = err.failures.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(failed, ["apps.c", "apps.a"]);
        assert_eq!(events("agg-b"), ["provision", "cleanup"]);

        assert_ok!(ctx.cleanup().await);
        assert_eq!(events("agg-a"), ["provision", "cleanup"]);
        assert!(ctx.is_released());
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let mut ctx = context(json!({ "a": { "tag": "life-a" } }));
        assert_ok!(ctx.load("apps.a").await);
        let entry = Arc::clone(ctx.get("apps.a").unwrap());

        // Stop before start does nothing.
        assert_ok!(entry.stop().await);
        assert_eq!(entry.state(), ModuleState::Provisioned);

        assert_ok!(entry.start().await);
        assert_eq!(entry.state(), ModuleState::Running);
        assert_err!(entry.start().await);

        assert_ok!(entry.stop().await);
        assert_eq!(entry.state(), ModuleState::Stopped);
        assert_ok!(entry.stop().await);

        let err = assert_err!(entry.start().await);
        let transition = err.source.downcast_ref::<InvalidTransition>().unwrap();
        assert_eq!(transition.state, ModuleState::Stopped);
        assert_eq!(events("life-a"), ["provision", "start", "stop"]);
    }

    #[tokio::test]
    async fn test_handles_die_with_context() {
        let mut ctx = context(json!({ "a": { "tag": "weak-a" } }));
        let handle = assert_ok!(ctx.load("apps.a").await);
        assert!(handle.downcast::<Recorder>().is_some());

        drop(ctx);
        assert!(handle.upgrade().is_none());
    }
}
