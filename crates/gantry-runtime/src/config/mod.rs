//! Configuration module for the Gantry runtime.
//!
//! Layered loading (files, environment, programmatic overrides) of the
//! process settings and of the `apps` section that becomes the supervisor's
//! configuration tree.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    GantryConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SpanEventConfig,
    SupervisorConfig,
};
pub use validation::validate_config;
