//! Module capability traits.
//!
//! A module has exactly two required capabilities, [`Module::start`] and
//! [`Module::stop`]. Everything else is opt-in: a module that wants to be
//! validated, provisioned or cleaned up implements the matching trait and
//! answers the corresponding capability query with `Some(self)`.
//!
//! ```rust,ignore
//! #[derive(Deserialize)]
//! struct Echo { listen: String }
//!
//! #[async_trait]
//! impl Module for Echo {
//!     async fn start(&self) -> Result<(), BoxError> { /* bind, spawn */ Ok(()) }
//!     async fn stop(&self) -> Result<(), BoxError> { Ok(()) }
//!
//!     fn as_validator(&self) -> Option<&dyn Validate> {
//!         Some(self)
//!     }
//! }
//!
//! impl Validate for Echo {
//!     fn validate(&self) -> Result<(), BoxError> {
//!         self.listen.parse::<SocketAddr>()?;
//!         Ok(())
//!     }
//! }
//! ```

use std::any::Any;
use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::context::Context;
use crate::error::BoxError;
use crate::path::ModulePath;

// =============================================================================
// Required capability
// =============================================================================

/// A pluggable unit of functionality.
///
/// Instances are owned by the [`Context`] that loaded them and shared as
/// `Arc<dyn Module>`, so `start` and `stop` take `&self`; keep runtime handles
/// (listeners, task handles) behind interior mutability.
///
/// `start` must fail atomically: if it returns `Err`, nothing it began may be
/// left running.
#[async_trait]
pub trait Module: AsAny {
    /// Brings up the module's externally visible service.
    async fn start(&self) -> Result<(), BoxError>;

    /// Stops the service started by [`start`](Self::start).
    async fn stop(&self) -> Result<(), BoxError>;

    /// Returns the validation capability, if the module has one.
    fn as_validator(&self) -> Option<&dyn Validate> {
        None
    }

    /// Returns the provisioning capability, if the module has one.
    fn as_provisioner(&mut self) -> Option<&mut dyn Provision> {
        None
    }

    /// Returns the cleanup capability, if the module has one.
    fn as_cleanup(&self) -> Option<&dyn Cleanup> {
        None
    }
}

// =============================================================================
// Optional capabilities
// =============================================================================

/// Checks a freshly decoded configuration before anything is provisioned.
pub trait Validate: Send + Sync {
    /// Returns `Err` describing the configuration defect.
    fn validate(&self) -> Result<(), BoxError>;
}

/// Prepares a module for starting, resolving the modules it depends on.
#[async_trait]
pub trait Provision: Send + Sync {
    /// Called once after validation. Use `ctx` to load dependencies by path.
    async fn provision(&mut self, ctx: &mut Context) -> Result<(), BoxError>;
}

/// Releases resources acquired during provisioning.
#[async_trait]
pub trait Cleanup: Send + Sync {
    /// Called once when the owning context is released.
    async fn cleanup(&self) -> Result<(), BoxError>;
}

// =============================================================================
// Downcasting
// =============================================================================

/// Upcast helpers for downcasting `dyn Module` to its concrete type.
///
/// Implemented for every `Send + Sync + 'static` type.
pub trait AsAny: Any + Send + Sync {
    /// Borrows `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Converts a shared module into `Arc<dyn Any>`.
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl dyn Module {
    /// Returns `true` if the concrete type is `T`.
    pub fn is<T: Module>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Borrows the concrete module.
    pub fn downcast_ref<T: Module>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

// =============================================================================
// ModuleRef
// =============================================================================

/// Non-owning handle to a module loaded through a [`Context`].
///
/// The context keeps ownership; once it is released and the last snapshot of
/// it is dropped, [`upgrade`](Self::upgrade) returns `None`.
#[derive(Clone)]
pub struct ModuleRef {
    path: ModulePath,
    module: Weak<dyn Module>,
}

impl ModuleRef {
    pub(crate) fn new(path: ModulePath, module: &Arc<dyn Module>) -> Self {
        Self {
            path,
            module: Arc::downgrade(module),
        }
    }

    /// Path the module was loaded from.
    pub fn path(&self) -> &ModulePath {
        &self.path
    }

    /// Returns the module if it is still alive.
    pub fn upgrade(&self) -> Option<Arc<dyn Module>> {
        self.module.upgrade()
    }

    /// Returns the module as its concrete type, if alive and of type `T`.
    pub fn downcast<T: Module>(&self) -> Option<Arc<T>> {
        self.upgrade()?.into_any_arc().downcast::<T>().ok()
    }
}

impl std::fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRef")
            .field("path", &self.path)
            .field("alive", &(self.module.strong_count() > 0))
            .finish()
    }
}
