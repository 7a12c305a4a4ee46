//! Reconfiguration error types.

use std::fmt;

use thiserror::Error;

use gantry_core::{CleanupError, LoadError, ModulePath, StartError, StopError};

/// A reconfiguration attempt failed and the active configuration was kept.
#[derive(Debug, Error)]
pub enum ReconfigureError {
    /// An app (or one of its dependencies) could not be loaded.
    ///
    /// Nothing from the new configuration was started.
    #[error("configuration rejected: {0}")]
    Load(#[from] LoadError),

    /// An app failed to start; the apps started before it were rolled back.
    #[error("{error}; configuration rolled back{}", RollbackNote(.rollback, .cleanup))]
    Start {
        /// The failed start.
        #[source]
        error: StartError,
        /// Stop failures of already-started apps during rollback.
        rollback: Vec<StopError>,
        /// Cleanup failures while releasing the rejected context.
        cleanup: Option<CleanupError>,
    },

    /// The runtime shut down while the attempt was still running.
    #[error("reconfiguration interrupted by runtime shutdown")]
    Interrupted,
}

impl ReconfigureError {
    /// Path of the module that made the attempt fail.
    pub fn path(&self) -> Option<&ModulePath> {
        match self {
            Self::Load(err) => Some(err.path()),
            Self::Start { error, .. } => Some(&error.path),
            Self::Interrupted => None,
        }
    }

    /// Returns `true` if rollback itself ran into errors.
    pub fn rollback_failed(&self) -> bool {
        match self {
            Self::Load(_) | Self::Interrupted => false,
            Self::Start {
                rollback, cleanup, ..
            } => !rollback.is_empty() || cleanup.is_some(),
        }
    }
}

struct RollbackNote<'a>(&'a [StopError], &'a Option<CleanupError>);

impl fmt::Display for RollbackNote<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.0.is_empty() {
            write!(f, " ({} stop failure(s) during rollback)", self.0.len())?;
        }
        if let Some(cleanup) = self.1 {
            write!(f, " ({cleanup})")?;
        }
        Ok(())
    }
}

/// Errors while tearing down a superseded (or final) configuration.
///
/// Never fatal: the configuration that replaced it stays active.
#[derive(Debug, Error)]
#[error("teardown of generation {generation}: {}", TeardownSummary(.stop, .cleanup))]
pub struct TeardownError {
    /// Generation being torn down.
    pub generation: u64,
    /// Apps whose `stop` failed.
    pub stop: Vec<StopError>,
    /// Aggregated cleanup failures.
    pub cleanup: Option<CleanupError>,
}

struct TeardownSummary<'a>(&'a [StopError], &'a Option<CleanupError>);

impl fmt::Display for TeardownSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        if let Some(cleanup) = self.1 {
            if !self.0.is_empty() {
                f.write_str("; ")?;
            }
            write!(f, "{cleanup}")?;
        }
        Ok(())
    }
}

/// Result type for supervisor operations.
pub type ReconfigureResult<T = ()> = Result<T, ReconfigureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_error_mentions_rollback_failures() {
        let err = ReconfigureError::Start {
            error: StartError {
                path: "apps.faulty".into(),
                source: "port in use".into(),
            },
            rollback: vec![StopError {
                path: "apps.echo".into(),
                source: "hung".into(),
            }],
            cleanup: None,
        };
        assert_eq!(
            err.to_string(),
            "apps.faulty: start failed: port in use; configuration rolled back \
             (1 stop failure(s) during rollback)"
        );
        assert_eq!(err.path().unwrap().as_str(), "apps.faulty");
        assert!(err.rollback_failed());
    }

    #[test]
    fn test_teardown_summary() {
        let err = TeardownError {
            generation: 3,
            stop: vec![StopError {
                path: "apps.echo".into(),
                source: "hung".into(),
            }],
            cleanup: None,
        };
        assert_eq!(
            err.to_string(),
            "teardown of generation 3: apps.echo: stop failed: hung"
        );
    }
}
