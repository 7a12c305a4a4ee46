//! Process runtime: configuration sources, the supervisor and signal handling.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use gantry_runtime::GantryRuntime;
//!
//! let runtime = GantryRuntime::builder()
//!     .config_file("gantry.toml")
//!     .module_package(tcp_echo::register)
//!     .build()?;
//!
//! // Applies the configuration, then serves until Ctrl+C / SIGTERM.
//! // SIGHUP re-reads the configuration and reconfigures.
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use gantry_core::{ConfigTree, ModuleRegistry, Registrar};
use gantry_supervisor::Supervisor;

use crate::config::{ConfigError, ConfigLoader, GantryConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// The process runtime.
///
/// Owns the [`Supervisor`] and the configuration sources it is fed from.
/// Supervisor settings (reload policy and timeout) are read once when the
/// runtime is built; the `apps` section is re-read on every reload.
///
/// Apps start in the order the configuration files declare them. Apps that
/// only environment variables or [`RuntimeBuilder::set`] introduce come after
/// them, in key order.
pub struct GantryRuntime {
    loader: ConfigLoader,
    config: GantryConfig,
    supervisor: Arc<Supervisor>,
    reload_timeout: Duration,
}

impl GantryRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// The configuration the runtime was built with.
    pub fn config(&self) -> &GantryConfig {
        &self.config
    }

    /// The supervisor.
    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Re-reads all configuration sources and returns the new tree.
    pub fn load_config(&self) -> RuntimeResult<ConfigTree> {
        let config = self.loader.load()?;
        validate_config(&config)?;
        Ok(config.tree().map_err(ConfigError::from)?)
    }

    /// Re-reads configuration and applies it.
    pub async fn reload(&self) -> RuntimeResult<()> {
        let tree = self.load_config()?;
        self.apply(tree).await
    }

    /// Applies `tree` under the reload deadline.
    ///
    /// If the deadline passes the runtime stops waiting and returns
    /// [`RuntimeError::ReloadTimedOut`], but the attempt still finishes by
    /// committing or rolling back.
    pub async fn apply(&self, tree: ConfigTree) -> RuntimeResult<()> {
        match tokio::time::timeout(self.reload_timeout, self.supervisor.reconfigure(tree)).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                let secs = self.reload_timeout.as_secs();
                warn!(timeout_secs = secs, "Reload still running after deadline, no longer waiting");
                Err(RuntimeError::ReloadTimedOut { secs })
            }
        }
    }

    /// Applies the configuration, then serves until a shutdown signal.
    ///
    /// Ctrl+C and SIGTERM shut down; SIGHUP reloads. A failed reload is
    /// logged and the previous configuration keeps running.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("Gantry is now running. Press Ctrl+C to stop.");

        let served = self.wait_for_signals().await;
        let stopped = self.stop().await;
        served.and(stopped)
    }

    /// Applies the configuration and serves until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await
    }

    /// Stops every app and releases the active configuration.
    pub async fn stop(&self) -> RuntimeResult<()> {
        info!("Stopping Gantry runtime");
        self.supervisor.shutdown().await?;
        info!("Runtime stopped");
        Ok(())
    }

    async fn start(&self) -> RuntimeResult<()> {
        let tree = self.config.tree().map_err(ConfigError::from)?;
        info!(apps = tree.app_count(), "Applying initial configuration");
        self.apply(tree).await
    }

    async fn reload_logged(&self) {
        match self.reload().await {
            Ok(()) => info!(generation = self.supervisor.generation(), "Reload complete"),
            Err(e) => error!(error = %e, "Reload failed, previous configuration remains active"),
        }
    }

    /// Waits for a shutdown signal, reloading on SIGHUP.
    async fn wait_for_signals(&self) -> RuntimeResult<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigterm = signal(SignalKind::terminate()).map_err(RuntimeError::Signal)?;
            let mut sighup = signal(SignalKind::hangup()).map_err(RuntimeError::Signal)?;

            loop {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        result.map_err(RuntimeError::Signal)?;
                        info!("Received Ctrl+C, shutting down");
                        return Ok(());
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                        return Ok(());
                    }
                    _ = sighup.recv() => {
                        info!("Received SIGHUP, reloading configuration");
                        self.reload_logged().await;
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`GantryRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    packages: Vec<Registrar>,
    init_logging: bool,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            packages: Vec::new(),
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges a whole configuration as programmatic defaults.
    pub fn merge(mut self, config: GantryConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Overrides a single dotted configuration key.
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.config_loader = self.config_loader.set(key, value);
        self
    }

    /// Adds a module package. Packages register in the order they are added.
    pub fn module_package(mut self, register: Registrar) -> Self {
        self.packages.push(register);
        self
    }

    /// Skips installing the global tracing subscriber.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Loads configuration, builds and freezes the registry, and creates the supervisor.
    pub fn build(self) -> RuntimeResult<GantryRuntime> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let registry = ModuleRegistry::with_packages(&self.packages)?.freeze();
        info!(
            module_types = registry.len(),
            reload_policy = config.supervisor.reload_policy.as_str(),
            "Runtime initialized from configuration"
        );

        let supervisor =
            Supervisor::new(registry).with_policy(config.supervisor.reload_policy);

        Ok(GantryRuntime {
            loader: self.config_loader,
            reload_timeout: Duration::from_secs(config.supervisor.reload_timeout_secs),
            config,
            supervisor: Arc::new(supervisor),
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gantry_core::{BoxError, Module, ModuleDescriptor, ModuleState, RegistryResult};
    use serde::Deserialize;
    use std::sync::Mutex;
    use tempfile::{TempDir, tempdir};
    use tokio_test::{assert_err, assert_ok};

    static JOURNAL: Mutex<Vec<String>> = Mutex::new(Vec::new());

    fn events(tag: &str) -> Vec<String> {
        let prefix = format!("{tag}:");
        JOURNAL
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Beacon {
        tag: String,
        delay_ms: u64,
    }

    #[async_trait]
    impl Module for Beacon {
        async fn start(&self) -> Result<(), BoxError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            JOURNAL.lock().unwrap().push(format!("{}:start", self.tag));
            Ok(())
        }

        async fn stop(&self) -> Result<(), BoxError> {
            JOURNAL.lock().unwrap().push(format!("{}:stop", self.tag));
            Ok(())
        }
    }

    fn register(registry: &mut ModuleRegistry) -> RegistryResult<()> {
        for id in ["beacon", "zulu", "alpha"] {
            registry.register(ModuleDescriptor::of::<Beacon>(id))?;
        }
        Ok(())
    }

    fn builder(dir: &TempDir) -> RuntimeBuilder {
        RuntimeBuilder::new()
            .search_path(dir.path())
            .without_env()
            .without_logging()
            .module_package(register)
    }

    #[tokio::test]
    async fn test_run_until_starts_and_stops_apps() {
        let dir = tempdir().unwrap();
        let runtime = builder(&dir)
            .set("apps.beacon.tag", "rt-run")
            .build()
            .unwrap();

        let supervisor = Arc::clone(runtime.supervisor());
        assert_ok!(
            runtime
                .run_until(async move {
                    assert_eq!(supervisor.app_state("beacon"), Some(ModuleState::Running));
                })
                .await
        );

        assert_eq!(events("rt-run"), ["start", "stop"]);
        assert!(runtime.supervisor().snapshot().is_none());
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected_at_build() {
        let dir = tempdir().unwrap();
        let err = builder(&dir)
            .set("supervisor.reload_timeout_secs", 0)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[tokio::test]
    async fn test_duplicate_package_rejected_at_build() {
        let dir = tempdir().unwrap();
        let err = builder(&dir)
            .module_package(register)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RuntimeError::Registry(_)));
    }

    #[tokio::test]
    async fn test_unknown_app_keeps_runtime_idle() {
        let dir = tempdir().unwrap();
        let runtime = builder(&dir)
            .set("apps.nothing.tag", "rt-unknown")
            .build()
            .unwrap();

        let err = assert_err!(runtime.reload().await);
        assert!(matches!(err, RuntimeError::Reconfigure(_)));
        assert!(runtime.supervisor().snapshot().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_timeout_abandons_wait_only() {
        let dir = tempdir().unwrap();
        let runtime = builder(&dir)
            .set("supervisor.reload_timeout_secs", 1)
            .set("apps.beacon.tag", "rt-slow")
            .set("apps.beacon.delay_ms", 5_000)
            .build()
            .unwrap();

        let err = assert_err!(runtime.reload().await);
        assert!(matches!(err, RuntimeError::ReloadTimedOut { secs: 1 }));
        assert_eq!(runtime.supervisor().generation(), 0);

        // The attempt keeps going and commits.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runtime.supervisor().generation(), 1);
        assert_eq!(events("rt-slow"), ["start"]);
    }

    #[cfg(feature = "toml-config")]
    #[tokio::test]
    async fn test_reload_rereads_configuration_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gantry.toml");
        std::fs::write(&path, "[apps.beacon]\ntag = \"rt-v1\"\n").unwrap();

        let runtime = RuntimeBuilder::new()
            .config_file(&path)
            .without_env()
            .without_logging()
            .module_package(register)
            .build()
            .unwrap();
        assert_ok!(runtime.reload().await);

        std::fs::write(&path, "[apps.beacon]\ntag = \"rt-v2\"\n").unwrap();
        assert_ok!(runtime.reload().await);

        assert_eq!(events("rt-v1"), ["start", "stop"]);
        assert_eq!(events("rt-v2"), ["start"]);
        assert_eq!(runtime.supervisor().generation(), 2);
        assert_ok!(runtime.stop().await);
    }

    #[cfg(feature = "toml-config")]
    #[tokio::test]
    async fn test_apps_start_in_file_order() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("gantry.toml"),
            "[apps.zulu]\ntag = \"fo-zulu\"\n\n[apps.alpha]\ntag = \"fo-alpha\"\n",
        )
        .unwrap();

        let runtime = builder(&dir).set("apps.beacon.tag", "fo-beacon").build().unwrap();
        assert_ok!(runtime.reload().await);

        let started: Vec<_> = JOURNAL
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("fo-") && e.ends_with(":start"))
            .cloned()
            .collect();
        assert_eq!(started, ["fo-zulu:start", "fo-alpha:start", "fo-beacon:start"]);

        let snapshot = runtime.supervisor().snapshot().unwrap();
        let names: Vec<_> = snapshot.apps().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["zulu", "alpha", "beacon"]);
        assert_ok!(runtime.stop().await);
    }
}
