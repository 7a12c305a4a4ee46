//! The supervisor: owner of the active configuration.
//!
//! [`Supervisor::reconfigure`] is the only way the running system changes. An
//! attempt runs under one exclusive lock and goes through five steps:
//!
//! 1. build a fresh [`Context`] bound to the new tree;
//! 2. load every top-level app (fail fast, nothing is started yet);
//! 3. start every app in declared order (on failure, stop what was started in
//!    reverse order and release the new context);
//! 4. swap the active state;
//! 5. stop and release the superseded configuration.
//!
//! Steps 1–3 leave the active configuration untouched when they fail. Errors in
//! step 5 are logged and retained, but never undo the swap.
//!
//! Attempts run on their own tokio task. Dropping the future returned by
//! `reconfigure` (for example under `tokio::time::timeout`) stops the wait, not
//! the attempt: it still ends by committing or rolling back.
//!
//! Readers never take the lock: [`snapshot`](Supervisor::snapshot) returns an
//! immutable `Arc<ActiveState>` that is either fully old or fully new.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, error, info, info_span, warn};

use gantry_core::{
    BoxError, ConfigTree, Context, LoadedModule, ModuleRegistry, ModuleState, StartError,
    StopError,
};

use crate::active::ActiveState;
use crate::error::{ReconfigureError, ReconfigureResult, TeardownError};
use crate::policy::ReloadPolicy;

/// Owns the active configuration and applies new ones atomically.
pub struct Supervisor {
    registry: Arc<ModuleRegistry>,
    policy: ReloadPolicy,
    shared: Arc<Shared>,
}

/// State the detached attempt tasks work on.
struct Shared {
    active: ArcSwapOption<ActiveState>,
    /// Serializes `reconfigure` and `shutdown`.
    lock: Mutex<()>,
    /// Last committed generation.
    generation: AtomicU64,
    last_teardown: parking_lot::Mutex<Option<Arc<TeardownError>>>,
}

impl Supervisor {
    /// Creates a supervisor with no active configuration.
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self {
            registry,
            policy: ReloadPolicy::default(),
            shared: Arc::new(Shared {
                active: ArcSwapOption::empty(),
                lock: Mutex::new(()),
                generation: AtomicU64::new(0),
                last_teardown: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// Sets the reload policy.
    pub fn with_policy(mut self, policy: ReloadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The reload policy in effect.
    pub fn policy(&self) -> ReloadPolicy {
        self.policy
    }

    /// The frozen module registry.
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// The active configuration, or `None` before the first successful
    /// reconfiguration and after shutdown.
    pub fn snapshot(&self) -> Option<Arc<ActiveState>> {
        self.shared.active.load_full()
    }

    /// Generation of the last committed configuration (`0` if none yet).
    pub fn generation(&self) -> u64 {
        self.shared.generation()
    }

    /// Lifecycle state of the active app `name`.
    pub fn app_state(&self, name: &str) -> Option<ModuleState> {
        self.shared.active.load().as_ref()?.app_state(name)
    }

    /// The error reported by the most recent teardown, if it failed.
    ///
    /// Set by every reconfiguration that retires a configuration and by
    /// [`shutdown`](Self::shutdown); a clean teardown clears it.
    pub fn last_teardown_error(&self) -> Option<Arc<TeardownError>> {
        self.shared.last_teardown.lock().clone()
    }

    /// Applies `tree` as the new desired state.
    ///
    /// On success every app of `tree` is running and nothing from the previous
    /// configuration is. On error the previous configuration is still active
    /// and nothing from `tree` is running.
    ///
    /// The attempt runs on a spawned task and completes even if this future
    /// is dropped. Must be called within a tokio runtime.
    pub async fn reconfigure(&self, tree: ConfigTree) -> ReconfigureResult {
        let attempt = Arc::clone(&self.shared).reconfigure(
            Arc::clone(&self.registry),
            self.policy,
            tree,
        );
        detach(attempt)
            .await
            .unwrap_or(Err(ReconfigureError::Interrupted))
    }

    /// Stops and releases the active configuration.
    ///
    /// Apps stop in reverse declared order. Afterwards there is no active
    /// configuration; a later [`reconfigure`](Self::reconfigure) starts fresh.
    /// Teardown errors are returned and also kept as
    /// [`last_teardown_error`](Self::last_teardown_error).
    pub async fn shutdown(&self) -> Result<(), Arc<TeardownError>> {
        match detach(Arc::clone(&self.shared).shutdown()).await {
            Some(result) => result,
            None => {
                warn!("Shutdown interrupted by runtime shutdown");
                Ok(())
            }
        }
    }
}

impl Shared {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    async fn reconfigure(
        self: Arc<Self>,
        registry: Arc<ModuleRegistry>,
        policy: ReloadPolicy,
        tree: ConfigTree,
    ) -> ReconfigureResult {
        let _guard = self.lock.lock().await;
        let generation = self.generation() + 1;

        if policy == ReloadPolicy::SkipUnchanged
            && let Some(current) = self.active.load_full()
            && *current.tree() == tree
        {
            info!(
                generation = current.generation(),
                "Configuration unchanged, keeping active apps"
            );
            return Ok(());
        }

        self.apply(registry, tree, generation)
            .instrument(info_span!("reconfigure", generation))
            .await
    }

    async fn shutdown(self: Arc<Self>) -> Result<(), Arc<TeardownError>> {
        let _guard = self.lock.lock().await;
        let Some(previous) = self.active.swap(None) else {
            debug!("Shutdown requested with no active configuration");
            return Ok(());
        };

        info!(generation = previous.generation(), "Shutting down active configuration");
        let result = teardown(&previous).await.map(Arc::new);
        *self.last_teardown.lock() = result.clone();
        match result {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn apply(
        &self,
        registry: Arc<ModuleRegistry>,
        tree: ConfigTree,
        generation: u64,
    ) -> ReconfigureResult {
        // 1. Fresh context.
        let mut context = Context::new(registry, tree.clone());

        // 2. Load every app before anything is started.
        let mut apps = Vec::with_capacity(tree.app_count());
        for path in tree.apps() {
            match context.load_entry(path, None).await {
                Ok(entry) => apps.push(entry),
                Err(err) => {
                    error!(path = %err.path(), error = %err, "Configuration rejected");
                    if let Err(cleanup) = context.cleanup().await {
                        warn!(error = %cleanup, "Cleanup of rejected configuration failed");
                    }
                    return Err(err.into());
                }
            }
        }
        debug!(apps = apps.len(), modules = context.len(), "Configuration provisioned");

        // 3. Start in declared order, rolling back on the first failure.
        for (i, app) in apps.iter().enumerate() {
            if let Err(err) = start_app(app).await {
                error!(path = %err.path, error = %err, "App failed to start, rolling back");
                let rollback = stop_apps(&apps[..i]).await;
                let cleanup = context.cleanup().await.err();
                return Err(ReconfigureError::Start {
                    error: err,
                    rollback,
                    cleanup,
                });
            }
        }

        // 4. Commit.
        let state = Arc::new(ActiveState::new(generation, tree, context, apps));
        let previous = self.active.swap(Some(state));
        self.generation.store(generation, Ordering::Release);
        info!(
            previous = previous.as_ref().map(|p| p.generation()),
            "Configuration committed"
        );

        // 5. Retire the superseded configuration.
        if let Some(previous) = previous {
            let result = teardown(&previous).await.map(Arc::new);
            *self.last_teardown.lock() = result;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("policy", &self.policy)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

/// Drives `task` on its own tokio task and waits for it.
///
/// Panics are resumed in the caller. `None` means the runtime shut down
/// before the task finished.
async fn detach<F>(task: F) -> Option<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match tokio::spawn(task).await {
        Ok(output) => Some(output),
        Err(err) => match err.try_into_panic() {
            Ok(panic) => std::panic::resume_unwind(panic),
            Err(_) => None,
        },
    }
}

/// Starts `app`, reporting a panic in its `start` as a start failure.
async fn start_app(app: &LoadedModule) -> Result<(), StartError> {
    match AssertUnwindSafe(app.start()).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            let source: BoxError = format!("panicked: {message}").into();
            Err(StartError {
                path: app.path().clone(),
                source,
            })
        }
    }
}

/// Stops `apps` in reverse order, collecting failures.
async fn stop_apps(apps: &[Arc<LoadedModule>]) -> Vec<StopError> {
    let mut failures = Vec::new();
    for app in apps.iter().rev() {
        if let Err(err) = app.stop().await {
            warn!(path = %err.path, error = %err, "App failed to stop");
            failures.push(err);
        }
    }
    failures
}

/// Stops every app of `state` and releases its context.
async fn teardown(state: &ActiveState) -> Option<TeardownError> {
    let stop = stop_apps(state.app_entries()).await;
    let cleanup = state.context().cleanup().await.err();
    if stop.is_empty() && cleanup.is_none() {
        debug!(generation = state.generation(), "Previous configuration released");
        return None;
    }

    let err = TeardownError {
        generation: state.generation(),
        stop,
        cleanup,
    };
    warn!(error = %err, "Teardown of previous configuration reported errors");
    Some(err)
}
