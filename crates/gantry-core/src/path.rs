//! Dotted paths into the configuration tree.
//!
//! Every module is addressed by the path of its payload in the tree. Top-level
//! apps live at `apps.<name>`; modules nested inside an app's configuration
//! extend that path (`apps.echo.banner`).
//!
//! The path also determines the module's type id:
//!
//! | Path | Payload | Type id |
//! |------|---------|---------|
//! | `apps.echo` | `{ "listen": "…" }` | `echo` |
//! | `apps.http.handlers` | `{ "module": "cache" }` | `http.handlers.cache` |
//! | `apps.echo.banner` | `{ "module": "static" }` | `echo.banner.static` |

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root namespace holding the top-level apps.
pub const APPS_NAMESPACE: &str = "apps";

/// Payload field that names a module inside its namespace.
pub const MODULE_KEY: &str = "module";

/// A dotted path addressing a payload in the configuration tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModulePath(String);

impl ModulePath {
    /// Creates a path from its dotted representation.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Path of the top-level app `name`.
    pub fn app(name: &str) -> Self {
        Self(format!("{APPS_NAMESPACE}.{name}"))
    }

    /// Returns the dotted representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Appends a segment.
    pub fn child(&self, segment: &str) -> Self {
        Self(format!("{}.{segment}", self.0))
    }

    /// Returns the app name when this path is exactly `apps.<name>`.
    pub fn app_name(&self) -> Option<&str> {
        let rest = self.0.strip_prefix(APPS_NAMESPACE)?.strip_prefix('.')?;
        (!rest.is_empty() && !rest.contains('.')).then_some(rest)
    }

    /// The path without its leading `apps.` namespace.
    pub fn namespace(&self) -> &str {
        self.0
            .strip_prefix(APPS_NAMESPACE)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(&self.0)
    }

    /// Resolves the module type id for the payload stored at this path.
    pub fn module_id(&self, raw: &Value) -> String {
        match raw.get(MODULE_KEY).and_then(Value::as_str) {
            Some(name) => format!("{}.{name}", self.namespace()),
            None => self.namespace().to_string(),
        }
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModulePath {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}

impl From<String> for ModulePath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

impl From<&ModulePath> for ModulePath {
    fn from(path: &ModulePath) -> Self {
        path.clone()
    }
}

impl AsRef<str> for ModulePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ModulePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}
