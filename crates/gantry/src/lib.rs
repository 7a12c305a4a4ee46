//! # Gantry
//!
//! A configuration-driven module supervisor.
//!
//! ## Overview
//!
//! A running process is described by one JSON-shaped configuration tree. Each
//! entry under `apps` names a module type; the supervisor decodes, validates
//! and provisions every app (and, transitively, every module an app loads),
//! then starts them. Applying a new tree is all or nothing: either every new
//! app is running and the old ones are stopped and released, or the attempt
//! is rolled back and the old configuration keeps running.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐ tree ┌────────────┐ load ┌──────────────────────────────┐
//! │    Runtime     │─────▶│ Supervisor │─────▶│ Context (one per generation) │
//! │ config, SIGHUP │      │ commit or  │      │  apps.echo ──▶ echo.banner   │
//! └────────────────┘      │ rollback   │      │  apps.admin                  │
//!                         └────────────┘      └──────────────────────────────┘
//! ```
//!
//! - **Core**: module capabilities, type registry, configuration tree, context
//! - **Supervisor**: the active configuration and atomic reconfiguration
//! - **Runtime**: configuration sources, logging, signals
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gantry::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Default, Deserialize)]
//! struct Hello {
//!     greeting: String,
//! }
//!
//! #[async_trait]
//! impl Module for Hello {
//!     async fn start(&self) -> Result<(), BoxError> {
//!         info!("{}", self.greeting);
//!         Ok(())
//!     }
//!
//!     async fn stop(&self) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//! }
//!
//! fn register(registry: &mut ModuleRegistry) -> RegistryResult<()> {
//!     registry.register(ModuleDescriptor::of::<Hello>("hello"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RuntimeError> {
//!     GantryRuntime::builder()
//!         .module_package(register)
//!         .set("apps.hello.greeting", "Hello, Gantry!")
//!         .build()?
//!         .run()
//!         .await
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use gantry_core as core;
pub use gantry_runtime as runtime;
pub use gantry_supervisor as supervisor;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use gantry::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use gantry_runtime::{GantryRuntime, RuntimeError, RuntimeResult};

    // Supervisor
    pub use gantry_supervisor::{ReloadPolicy, Supervisor};

    // Writing modules
    pub use gantry_core::{
        BoxError, Cleanup, Context, Module, ModuleDescriptor, ModuleRef, ModuleRegistry,
        Provision, RegistryResult, Validate, async_trait,
    };

    // Building trees by hand
    pub use gantry_core::{ConfigTree, ModulePath};

    pub use tracing::{debug, error, info, trace, warn};
}
