//! Module registry: type id → descriptor.
//!
//! The registry is populated once during startup by explicit registration
//! calls. Module packages expose a [`Registrar`] function; the entry point
//! calls each of them, then freezes the registry by moving it into an `Arc`
//! that the supervisor only ever reads.
//!
//! ```rust,ignore
//! pub fn register(registry: &mut ModuleRegistry) -> RegistryResult<()> {
//!     registry.register(ModuleDescriptor::of::<Echo>("echo"))?;
//!     registry.register(ModuleDescriptor::of::<StaticBanner>("echo.banner.static"))
//! }
//!
//! let registry = ModuleRegistry::with_packages(&[tcp_echo::register])?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::module::Module;

/// Factory turning a raw payload into a fresh module instance.
pub type ModuleFactory = fn(&Value) -> serde_json::Result<Box<dyn Module>>;

/// Registration entry point exposed by a module package.
pub type Registrar = fn(&mut ModuleRegistry) -> RegistryResult<()>;

// =============================================================================
// ModuleDescriptor
// =============================================================================

/// Static description of a module type: its id and how to instantiate it.
#[derive(Clone, Copy)]
pub struct ModuleDescriptor {
    id: &'static str,
    factory: ModuleFactory,
}

impl ModuleDescriptor {
    /// Describes module type `M`, decoded from its payload with serde.
    ///
    /// A `null` payload decodes as `{}`, so modules whose fields all have
    /// `#[serde(default)]` need no configuration at all.
    pub fn of<M>(id: &'static str) -> Self
    where
        M: Module + DeserializeOwned,
    {
        Self {
            id,
            factory: decode_module::<M>,
        }
    }

    /// Describes a module type with a hand-written factory.
    pub fn with_factory(id: &'static str, factory: ModuleFactory) -> Self {
        Self { id, factory }
    }

    /// The module type id.
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// Creates a new instance from `raw`.
    pub fn instantiate(&self, raw: &Value) -> serde_json::Result<Box<dyn Module>> {
        (self.factory)(raw)
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

fn decode_module<M>(raw: &Value) -> serde_json::Result<Box<dyn Module>>
where
    M: Module + DeserializeOwned,
{
    let module = if raw.is_null() {
        M::deserialize(&Value::Object(Map::new()))?
    } else {
        M::deserialize(raw)?
    };
    Ok(Box::new(module))
}

// =============================================================================
// ModuleRegistry
// =============================================================================

/// Table of registered module types.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    descriptors: HashMap<&'static str, ModuleDescriptor>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry and runs every package registrar against it.
    pub fn with_packages(packages: &[Registrar]) -> RegistryResult<Self> {
        let mut registry = Self::new();
        for register in packages {
            register(&mut registry)?;
        }
        Ok(registry)
    }

    /// Registers a descriptor.
    ///
    /// Fails with [`RegistryError::DuplicateType`] if the id is taken and with
    /// [`RegistryError::InvalidId`] if the id is not a dotted identifier.
    pub fn register(&mut self, descriptor: ModuleDescriptor) -> RegistryResult<()> {
        let id = descriptor.id();
        if !is_valid_module_id(id) {
            return Err(RegistryError::InvalidId(id.to_string()));
        }
        if self.descriptors.contains_key(id) {
            return Err(RegistryError::DuplicateType(id.to_string()));
        }
        self.descriptors.insert(id, descriptor);
        debug!(type_id = %id, "Registered module type");
        Ok(())
    }

    /// Looks up a descriptor by type id.
    pub fn lookup(&self, id: &str) -> RegistryResult<&ModuleDescriptor> {
        self.descriptors
            .get(id)
            .ok_or_else(|| RegistryError::UnknownType(id.to_string()))
    }

    /// Returns `true` if `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.descriptors.contains_key(id)
    }

    /// Registered type ids, sorted.
    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.descriptors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Freezes the registry for sharing with the supervisor.
    pub fn freeze(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// Returns `true` if `id` is a dotted sequence of `[A-Za-z0-9_-]+` segments.
pub fn is_valid_module_id(id: &str) -> bool {
    !id.is_empty()
        && id.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Noop {
        label: String,
    }

    #[async_trait]
    impl Module for Noop {
        async fn start(&self) -> Result<(), BoxError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), BoxError> {
            Ok(())
        }
    }

    fn register_noop(registry: &mut ModuleRegistry) -> RegistryResult<()> {
        registry.register(ModuleDescriptor::of::<Noop>("noop"))
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ModuleRegistry::new();
        registry
            .register(ModuleDescriptor::of::<Noop>("noop"))
            .unwrap();
        assert_eq!(
            registry.register(ModuleDescriptor::of::<Noop>("noop")),
            Err(RegistryError::DuplicateType("noop".into()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_unknown_type() {
        let registry = ModuleRegistry::new();
        assert_eq!(
            registry.lookup("http").unwrap_err(),
            RegistryError::UnknownType("http".into())
        );
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let mut registry = ModuleRegistry::new();
        for id in ["", "http.", ".http", "http..cache", "http cache"] {
            assert_eq!(
                registry.register(ModuleDescriptor::of::<Noop>(id)),
                Err(RegistryError::InvalidId(id.into()))
            );
        }
        assert!(is_valid_module_id("http.handlers.cache"));
        assert!(is_valid_module_id("tcp-echo_2"));
    }

    #[test]
    fn test_packages_register_in_order() {
        let registry = ModuleRegistry::with_packages(&[register_noop]).unwrap();
        assert_eq!(registry.ids(), ["noop"]);

        let err = ModuleRegistry::with_packages(&[register_noop, register_noop]).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateType("noop".into()));
    }

    #[test]
    fn test_instantiate_decodes_payload() {
        let descriptor = ModuleDescriptor::of::<Noop>("noop");
        let module = descriptor.instantiate(&json!({ "label": "x" })).unwrap();
        assert_eq!(module.downcast_ref::<Noop>().unwrap().label, "x");

        let module = descriptor.instantiate(&Value::Null).unwrap();
        assert!(module.downcast_ref::<Noop>().unwrap().label.is_empty());

        assert!(descriptor.instantiate(&json!({ "label": 3 })).is_err());
    }
}
