//! Explicit store registry
//!
//! The registry maps driver names to store factories so a backend can be
//! picked by name from configuration. It is a plain object populated by
//! explicit calls at process start; nothing registers itself as a
//! module-load side effect.
//!
//! ## Usage
//!
//! ```rust,no_run
//! # async fn demo() -> leasehold_core::Result<()> {
//! use leasehold_core::{StoreConfig, StoreRegistry};
//!
//! let registry = StoreRegistry::with_builtins();
//! let _store = registry.create(&StoreConfig::Memory).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::store::{DurableStoreFactory, MemoryStoreFactory};
use crate::traits::{BindingStore, BindingStoreFactory};

/// Registry of binding-store drivers
///
/// ## Thread Safety
///
/// Interior mutability with RwLock allows concurrent lookups and exclusive
/// registration.
#[derive(Default)]
pub struct StoreRegistry {
    factories: RwLock<HashMap<String, Arc<dyn BindingStoreFactory>>>,
}

impl StoreRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in `memory` and `durable` drivers
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("memory", Box::new(MemoryStoreFactory));
        registry.register("durable", Box::new(DurableStoreFactory));
        registry
    }

    /// Register a store factory under a driver name
    pub fn register(&self, name: impl Into<String>, factory: Box<dyn BindingStoreFactory>) {
        let name = name.into();
        let mut factories = self.factories.write().unwrap();
        factories.insert(name, Arc::from(factory));
    }

    /// Create a store from configuration
    ///
    /// Fails with a configuration error when the driver named by `config`
    /// is not registered.
    pub async fn create(&self, config: &StoreConfig) -> Result<Box<dyn BindingStore>> {
        let driver = config.driver_name();
        let factory = {
            let factories = self.factories.read().unwrap();
            factories.get(driver).cloned()
        }
        .ok_or_else(|| Error::config(format!("unknown store driver: {driver}")))?;

        let config_json = serde_json::to_value(config)?;
        factory.create(&config_json).await
    }

    /// List all registered driver names
    pub fn list(&self) -> Vec<String> {
        let factories = self.factories.read().unwrap();
        factories.keys().cloned().collect()
    }

    /// Check whether a driver name is registered
    pub fn has(&self, name: &str) -> bool {
        let factories = self.factories.read().unwrap();
        factories.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingFactory;

    #[async_trait]
    impl BindingStoreFactory for FailingFactory {
        async fn create(&self, _config: &serde_json::Value) -> Result<Box<dyn BindingStore>> {
            Err(Error::config("always fails"))
        }
    }

    #[test]
    fn registration_is_visible() {
        let registry = StoreRegistry::new();
        assert!(!registry.has("failing"));

        registry.register("failing", Box::new(FailingFactory));

        assert!(registry.has("failing"));
        assert!(registry.list().contains(&"failing".to_string()));
    }

    #[tokio::test]
    async fn builtins_cover_the_memory_driver() {
        let registry = StoreRegistry::with_builtins();
        assert!(registry.has("memory"));
        assert!(registry.has("durable"));

        let store = registry.create(&StoreConfig::Memory).await.unwrap();
        assert!(
            store
                .list_addresses(crate::Deadline::none())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn unknown_driver_is_a_config_error() {
        let registry = StoreRegistry::new();
        let err = match registry.create(&StoreConfig::Memory).await {
            Ok(_) => panic!("expected a config error for an empty registry"),
            Err(err) => err,
        };
        assert!(matches!(err, Error::Config(_)));
    }
}
