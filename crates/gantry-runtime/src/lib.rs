//! Gantry Runtime - process layer around the Gantry supervisor.
//!
//! This crate provides:
//! - Layered configuration loading (`gantry.toml`, `GANTRY_*` variables, overrides)
//! - Logging configuration
//! - Runtime orchestration (`GantryRuntime`): initial apply, SIGHUP reloads
//!   under a deadline, graceful shutdown
//!
//! ```ignore
//! use gantry_runtime::GantryRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gantry_runtime::RuntimeError> {
//!     let runtime = GantryRuntime::builder()
//!         .module_package(tcp_echo::register)
//!         .build()?;
//!
//!     // Run until Ctrl+C
//!     runtime.run().await
//! }
//! ```
//!
//! # Configuration file
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [supervisor]
//! reload_policy = "rebuild"
//! reload_timeout_secs = 30
//!
//! [apps.echo]
//! listen = "127.0.0.1:7000"
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, GantryConfig, LoggingConfig, SupervisorConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{GantryRuntime, RuntimeBuilder};
