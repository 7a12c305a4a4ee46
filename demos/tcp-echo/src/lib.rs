//! TCP echo package for Gantry.
//!
//! Registers three module types:
//!
//! | Type id | Module | Role |
//! |---------|--------|------|
//! | `echo` | [`EchoApp`] | app: listens on `listen` and echoes every byte back |
//! | `echo.banner.static` | [`StaticBanner`] | greeting taken from the configuration |
//! | `echo.banner.file` | [`FileBanner`] | greeting read from a file while provisioning |
//!
//! ```toml
//! [apps.echo]
//! listen = "127.0.0.1:7000"
//!
//! [apps.echo.banner]
//! module = "static"
//! text = "welcome to gantry"
//! ```
//!
//! Reloading with the same `listen` address hands the bound socket over to
//! the new app instead of rebinding it, so clients never see the port close.

mod banner;
mod echo;
mod listeners;

use gantry_core::{ModuleDescriptor, ModuleRegistry, RegistryResult};

pub use banner::{FileBanner, StaticBanner};
pub use echo::EchoApp;

/// Registers the package's module types.
pub fn register(registry: &mut ModuleRegistry) -> RegistryResult<()> {
    registry.register(ModuleDescriptor::of::<EchoApp>("echo"))?;
    registry.register(ModuleDescriptor::of::<StaticBanner>("echo.banner.static"))?;
    registry.register(ModuleDescriptor::of::<FileBanner>("echo.banner.file"))?;
    Ok(())
}
