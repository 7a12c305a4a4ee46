//! Reload policy.

use serde::{Deserialize, Serialize};

/// What [`Supervisor::reconfigure`](crate::Supervisor::reconfigure) does when
/// handed a tree equal to the active one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPolicy {
    /// Always build a fresh context and restart every app.
    #[default]
    Rebuild,
    /// Treat an identical tree as a successful no-op.
    SkipUnchanged,
}

impl ReloadPolicy {
    /// Returns the policy name as a static string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rebuild => "rebuild",
            Self::SkipUnchanged => "skip_unchanged",
        }
    }
}
