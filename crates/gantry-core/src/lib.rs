//! # Gantry Core
//!
//! The module model of the Gantry supervisor.
//!
//! This crate defines what a module is and how modules are found, decoded and
//! wired together. It knows nothing about reconfiguration; that is the job of
//! `gantry-supervisor`.
//!
//! - **Capabilities**: every module implements [`Module`] (`start`/`stop`) and
//!   may opt into [`Validate`], [`Provision`] and [`Cleanup`].
//! - **Registry**: type id → [`ModuleDescriptor`], filled by explicit
//!   [`Registrar`] calls before anything is loaded ([`ModuleRegistry`]).
//! - **Configuration tree**: an immutable JSON document ([`ConfigTree`])
//!   addressed by dotted [`ModulePath`]s.
//! - **Context**: per-generation container that loads modules lazily, detects
//!   dependency cycles and releases everything in reverse order ([`Context`]).
//!
//! ## Type ids
//!
//! A payload at `apps.<name>` is decoded by the module registered as `<name>`.
//! A nested payload that carries a `"module"` field selects its type inside the
//! namespace of its path:
//!
//! ```text
//! apps.echo               { "listen": "…" }                 → echo
//! apps.echo.banner        { "module": "static", … }         → echo.banner.static
//! ```

pub mod context;
pub mod error;
pub mod module;
pub mod path;
pub mod registry;
pub mod state;
pub mod tree;

pub use context::{Context, LoadedModule};
pub use error::{
    BoxError, CleanupError, InvalidTransition, LoadError, LoadResult, RegistryError,
    RegistryResult, StartError, StopError, TreeError,
};
pub use module::{AsAny, Cleanup, Module, ModuleRef, Provision, Validate};
pub use path::{APPS_NAMESPACE, MODULE_KEY, ModulePath};
pub use registry::{ModuleDescriptor, ModuleFactory, ModuleRegistry, Registrar, is_valid_module_id};
pub use state::ModuleState;
pub use tree::{ConfigTree, ConfigTreeBuilder, is_valid_app_name};

pub use async_trait::async_trait;
pub use futures::future::BoxFuture;
