//! Module lifecycle states.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a loaded module instance.
///
/// ```text
/// Unloaded ──load──► Provisioned ──start──► Running ──stop──► Stopped
///                         ▲                                      │
///                         └────── start failed (stays here)      │ terminal
/// ```
///
/// `Stopped` is never left: running the module again means loading a fresh
/// instance from its descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Not instantiated yet.
    Unloaded,
    /// Decoded, validated and provisioned, but not started.
    Provisioned,
    /// `Start` succeeded and `Stop` has not been called.
    Running,
    /// `Stop` was called.
    Stopped,
}

impl ModuleState {
    /// Whether `start` is allowed from this state.
    pub fn can_start(self) -> bool {
        self == Self::Provisioned
    }

    /// Whether `stop` has any effect from this state.
    pub fn can_stop(self) -> bool {
        self == Self::Running
    }

    /// Returns the state name as a static string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Provisioned => "provisioned",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
