//! # Gantry Supervisor
//!
//! Applies configuration trees to a running process, all or nothing.
//!
//! The [`Supervisor`] owns the single active configuration. Each call to
//! [`Supervisor::reconfigure`] either commits a complete new configuration
//! (every app running, everything from the previous one stopped and released)
//! or fails and leaves the previous configuration untouched.
//!
//! ```rust,ignore
//! let registry = ModuleRegistry::with_packages(&[tcp_echo::register])?.freeze();
//! let supervisor = Supervisor::new(registry);
//!
//! supervisor.reconfigure(tree).await?;
//! for app in supervisor.snapshot().into_iter().flat_map(|s| s.apps()) {
//!     println!("{} ({}) is {}", app.name, app.type_id, app.state);
//! }
//! supervisor.shutdown().await?;
//! ```

pub mod active;
pub mod error;
pub mod policy;
pub mod supervisor;

pub use active::{ActiveState, AppStatus};
pub use error::{ReconfigureError, ReconfigureResult, TeardownError};
pub use policy::ReloadPolicy;
pub use supervisor::Supervisor;
