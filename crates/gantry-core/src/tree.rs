//! The configuration tree: the desired system state handed to the supervisor.
//!
//! A [`ConfigTree`] wraps an already-parsed JSON document. The document is
//! shared behind an `Arc` and never mutated, so clones are cheap and two trees
//! can be compared for equality.
//!
//! ```json
//! {
//!   "apps": {
//!     "echo": { "listen": "127.0.0.1:7000", "banner": { "module": "static" } }
//!   }
//! }
//! ```

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::TreeError;
use crate::path::{APPS_NAMESPACE, ModulePath};

/// Immutable, ordered configuration document.
///
/// App order follows declaration order in the document (the workspace enables
/// `serde_json`'s `preserve_order`).
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigTree {
    root: Arc<Value>,
}

impl ConfigTree {
    /// A tree that declares no apps.
    pub fn empty() -> Self {
        Self::from_apps(Map::new())
    }

    /// Starts building a tree app by app.
    pub fn builder() -> ConfigTreeBuilder {
        ConfigTreeBuilder::default()
    }

    /// Wraps a map of app name → payload.
    ///
    /// App names are not checked here; use [`from_value`](Self::from_value)
    /// for untrusted documents.
    pub fn from_apps(apps: Map<String, Value>) -> Self {
        let mut root = Map::new();
        root.insert(APPS_NAMESPACE.to_string(), Value::Object(apps));
        Self {
            root: Arc::new(Value::Object(root)),
        }
    }

    /// Checks the shape of a parsed document and wraps it.
    ///
    /// The root must be an object; `apps`, when present, must be an object
    /// whose keys are non-empty and contain no `.`.
    pub fn from_value(value: Value) -> Result<Self, TreeError> {
        let Value::Object(root) = &value else {
            return Err(TreeError::new("root must be an object"));
        };
        match root.get(APPS_NAMESPACE) {
            None | Some(Value::Null) => {}
            Some(Value::Object(apps)) => {
                if let Some(name) = apps.keys().find(|name| !is_valid_app_name(name)) {
                    return Err(TreeError::new(format!("invalid app name '{name}'")));
                }
            }
            Some(_) => return Err(TreeError::new("'apps' must be an object")),
        }
        Ok(Self {
            root: Arc::new(value),
        })
    }

    /// Paths of the declared top-level apps, in declaration order.
    pub fn apps(&self) -> Vec<ModulePath> {
        self.root
            .get(APPS_NAMESPACE)
            .and_then(Value::as_object)
            .map(|apps| apps.keys().map(|name| ModulePath::app(name)).collect())
            .unwrap_or_default()
    }

    /// Number of declared apps.
    pub fn app_count(&self) -> usize {
        self.root
            .get(APPS_NAMESPACE)
            .and_then(Value::as_object)
            .map_or(0, Map::len)
    }

    /// Returns the payload stored at `path`, walking the document segment by segment.
    pub fn get(&self, path: &ModulePath) -> Option<&Value> {
        path.segments()
            .try_fold(self.root.as_ref(), |node, segment| node.get(segment))
    }

    /// The underlying document.
    pub fn as_value(&self) -> &Value {
        &self.root
    }
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self::empty()
    }
}

/// Returns `true` if `name` can be used as a top-level app name.
pub fn is_valid_app_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('.')
}

/// Incremental builder for [`ConfigTree`].
#[derive(Debug, Default)]
pub struct ConfigTreeBuilder {
    apps: Map<String, Value>,
}

impl ConfigTreeBuilder {
    /// Declares an app. Re-declaring a name replaces the payload but keeps its position.
    pub fn app(mut self, name: impl Into<String>, payload: Value) -> Self {
        self.apps.insert(name.into(), payload);
        self
    }

    /// Builds the tree, checking app names.
    pub fn build(self) -> Result<ConfigTree, TreeError> {
        if let Some(name) = self.apps.keys().find(|name| !is_valid_app_name(name)) {
            return Err(TreeError::new(format!("invalid app name '{name}'")));
        }
        Ok(ConfigTree::from_apps(self.apps))
    }
}
