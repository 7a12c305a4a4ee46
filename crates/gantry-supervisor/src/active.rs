//! Snapshots of the configuration currently serving.

use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;

use gantry_core::{ConfigTree, Context, LoadedModule, Module, ModulePath, ModuleState};

/// The committed configuration together with the context that owns its modules.
///
/// Obtained from [`Supervisor::snapshot`](crate::Supervisor::snapshot). A
/// snapshot is immutable; holding one keeps its module instances alive but
/// does not keep them running.
pub struct ActiveState {
    generation: u64,
    loaded_at: SystemTime,
    tree: ConfigTree,
    context: Context,
    apps: Vec<Arc<LoadedModule>>,
}

impl ActiveState {
    pub(crate) fn new(
        generation: u64,
        tree: ConfigTree,
        context: Context,
        apps: Vec<Arc<LoadedModule>>,
    ) -> Self {
        Self {
            generation,
            loaded_at: SystemTime::now(),
            tree,
            context,
            apps,
        }
    }

    /// Generation number, starting at 1 for the first committed configuration.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When this configuration was committed.
    pub fn loaded_at(&self) -> SystemTime {
        self.loaded_at
    }

    /// The tree this configuration was built from.
    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    /// The context owning every module of this configuration.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Top-level app entries in declared order.
    pub(crate) fn app_entries(&self) -> &[Arc<LoadedModule>] {
        &self.apps
    }

    /// Status of every top-level app, in declared order.
    pub fn apps(&self) -> Vec<AppStatus> {
        self.apps.iter().map(|entry| AppStatus::of(entry)).collect()
    }

    /// Number of top-level apps.
    pub fn app_count(&self) -> usize {
        self.apps.len()
    }

    /// Lifecycle state of the app `name`.
    pub fn app_state(&self, name: &str) -> Option<ModuleState> {
        self.find(name).map(|entry| entry.state())
    }

    /// The app `name` as its concrete type.
    pub fn app<T: Module>(&self, name: &str) -> Option<Arc<T>> {
        self.find(name)?.handle().downcast::<T>()
    }

    fn find(&self, name: &str) -> Option<&Arc<LoadedModule>> {
        self.apps
            .iter()
            .find(|entry| entry.path().app_name() == Some(name))
    }
}

impl std::fmt::Debug for ActiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveState")
            .field("generation", &self.generation)
            .field("loaded_at", &self.loaded_at)
            .field("apps", &self.apps())
            .finish_non_exhaustive()
    }
}

/// Point-in-time status of one top-level app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppStatus {
    /// App name (`echo` for `apps.echo`).
    pub name: String,
    /// Full path.
    pub path: ModulePath,
    /// Registered type id.
    pub type_id: &'static str,
    /// Lifecycle state.
    pub state: ModuleState,
}

impl AppStatus {
    fn of(entry: &LoadedModule) -> Self {
        Self {
            name: entry.path().namespace().to_string(),
            path: entry.path().clone(),
            type_id: entry.type_id(),
            state: entry.state(),
        }
    }
}
