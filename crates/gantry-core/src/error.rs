//! Unified error types for the Gantry core.
//!
//! Module capabilities report failures as a [`BoxError`]; the core wraps those
//! into the typed errors below so callers always learn *which* module failed
//! and at *which* lifecycle step.

use std::fmt;

use thiserror::Error;

use crate::path::ModulePath;
use crate::state::ModuleState;

/// Boxed error returned by module capability methods.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors raised by the [`ModuleRegistry`](crate::registry::ModuleRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A descriptor with this type id is already registered.
    #[error("module type '{0}' is already registered")]
    DuplicateType(String),

    /// No descriptor is registered under this type id.
    #[error("unknown module type '{0}'")]
    UnknownType(String),

    /// The type id is not a dotted sequence of non-empty segments.
    #[error("invalid module type id '{0}'")]
    InvalidId(String),
}

// =============================================================================
// Configuration Tree Errors
// =============================================================================

/// The document handed to [`ConfigTree::from_value`](crate::tree::ConfigTree::from_value)
/// does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration tree: {reason}")]
pub struct TreeError {
    /// What is wrong with the document.
    pub reason: String,
}

impl TreeError {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Load Errors
// =============================================================================

/// Errors that can occur while a [`Context`](crate::context::Context) loads a module.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The path resolves to a type id nobody registered.
    #[error("{path}: unknown module type '{type_id}'")]
    UnknownType {
        /// Path being loaded.
        path: ModulePath,
        /// Resolved type id.
        type_id: String,
    },

    /// The configuration tree has no payload at this path.
    #[error("{path}: no configuration at this path")]
    NotConfigured {
        /// Path being loaded.
        path: ModulePath,
    },

    /// The raw payload could not be decoded into the module type.
    #[error("{path}: decoding '{type_id}' configuration: {source}")]
    Decode {
        /// Path being loaded.
        path: ModulePath,
        /// Resolved type id.
        type_id: String,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// The module's `Validate` capability rejected its configuration.
    #[error("{path}: invalid configuration: {source}")]
    Validation {
        /// Path being loaded.
        path: ModulePath,
        /// Error reported by the module.
        #[source]
        source: BoxError,
    },

    /// The module's `Provision` capability failed.
    #[error("{path}: provisioning failed: {source}")]
    Provision {
        /// Path being loaded.
        path: ModulePath,
        /// Error reported by the module.
        #[source]
        source: BoxError,
    },

    /// The path was requested while it was still being resolved.
    #[error("module dependency cycle: {}", DisplayChain(.chain))]
    Cycle {
        /// The path requested twice.
        path: ModulePath,
        /// Resolution chain, starting and ending with `path`.
        chain: Vec<ModulePath>,
    },
}

impl LoadError {
    /// The path whose loading failed (the repeated path for cycles).
    pub fn path(&self) -> &ModulePath {
        match self {
            Self::UnknownType { path, .. }
            | Self::NotConfigured { path }
            | Self::Decode { path, .. }
            | Self::Validation { path, .. }
            | Self::Provision { path, .. }
            | Self::Cycle { path, .. } => path,
        }
    }
}

struct DisplayChain<'a>(&'a [ModulePath]);

impl fmt::Display for DisplayChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, path) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{path}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Lifecycle Errors
// =============================================================================

/// A lifecycle action was requested in a state that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} a module in state {state}")]
pub struct InvalidTransition {
    /// The refused action (`"start"`).
    pub action: &'static str,
    /// State the module was in.
    pub state: ModuleState,
}

/// A module's `Start` failed after successful provisioning.
#[derive(Debug, Error)]
#[error("{path}: start failed: {source}")]
pub struct StartError {
    /// Path of the module.
    pub path: ModulePath,
    /// Error reported by the module, or [`InvalidTransition`].
    #[source]
    pub source: BoxError,
}

/// A module's `Stop` failed.
#[derive(Debug, Error)]
#[error("{path}: stop failed: {source}")]
pub struct StopError {
    /// Path of the module.
    pub path: ModulePath,
    /// Error reported by the module.
    #[source]
    pub source: BoxError,
}

/// One or more `Cleanup` calls failed while a context was released.
///
/// Non-fatal: cleanup always runs for every module, failures are collected here.
#[derive(Debug, Error)]
#[error("{} module(s) failed to clean up: {}", .failures.len(), DisplayFailures(.failures))]
pub struct CleanupError {
    /// Failed modules in the order cleanup ran.
    pub failures: Vec<(ModulePath, BoxError)>,
}

struct DisplayFailures<'a>(&'a [(ModulePath, BoxError)]);

impl fmt::Display for DisplayFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (path, err)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{path}: {err}")?;
        }
        Ok(())
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for module loading.
pub type LoadResult<T> = Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display_lists_chain() {
        let err = LoadError::Cycle {
            path: "apps.a".into(),
            chain: vec!["apps.a".into(), "apps.b".into(), "apps.a".into()],
        };
        assert_eq!(
            err.to_string(),
            "module dependency cycle: apps.a -> apps.b -> apps.a"
        );
        assert_eq!(err.path().as_str(), "apps.a");
    }

    #[test]
    fn test_cleanup_error_aggregates() {
        let err = CleanupError {
            failures: vec![
                ("apps.a".into(), "disk full".into()),
                ("apps.b".into(), "socket busy".into()),
            ],
        };
        assert_eq!(
            err.to_string(),
            "2 module(s) failed to clean up: apps.a: disk full; apps.b: socket busy"
        );
    }
}
