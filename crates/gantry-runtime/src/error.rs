//! Runtime error types.

use std::sync::Arc;

use thiserror::Error;

use gantry_core::RegistryError;
use gantry_supervisor::{ReconfigureError, TeardownError};

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading or validating configuration failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A module package failed to register.
    #[error("Module registration failed: {0}")]
    Registry(#[from] RegistryError),

    /// The supervisor rejected the configuration; the previous one is still active.
    #[error("Reconfiguration failed: {0}")]
    Reconfigure(#[from] ReconfigureError),

    /// Stopping the final configuration reported errors.
    #[error("Shutdown incomplete: {0}")]
    Teardown(#[from] Arc<TeardownError>),

    /// The reload deadline passed; the attempt continues in the background.
    #[error("Reload did not finish within {secs}s")]
    ReloadTimedOut { secs: u64 },

    /// A signal handler could not be installed.
    #[error("Failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
