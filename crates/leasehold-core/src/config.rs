//! Configuration types for the allocation engine
//!
//! This module defines all configuration structures used throughout the
//! crate. Loading and parsing a configuration file is the caller's concern;
//! these types only describe and validate the result.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::range::{AddressRange, AddressRangeSet};

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Store backend selection
    pub store: StoreConfig,

    /// Allocatable address pool
    pub pool: Vec<RangeConfig>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.pool.is_empty() {
            return Err(Error::config("no address ranges configured"));
        }
        for range in &self.pool {
            range.to_range()?;
        }
        self.store.validate()?;
        self.engine.validate()?;
        Ok(())
    }

    /// The configured pool as a normalized range set
    pub fn pool_set(&self) -> Result<AddressRangeSet> {
        let mut set = AddressRangeSet::new();
        for range in &self.pool {
            set.insert(range.to_range()?);
        }
        Ok(set)
    }
}

/// One pool range, endpoints in string form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeConfig {
    pub start: String,
    pub end: String,
}

impl RangeConfig {
    /// Parse and validate into an [`AddressRange`]
    pub fn to_range(&self) -> Result<AddressRange> {
        AddressRange::parse(&self.start, &self.end)
    }
}

/// Store backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory store, no durability
    Memory,

    /// redb-backed durable store
    Durable {
        /// Path of the transactional store file
        path: String,
    },

    /// Custom store driver
    Custom {
        /// Factory name to look up in the registry
        factory: String,
        /// Driver-specific configuration data
        config: serde_json::Value,
    },
}

impl StoreConfig {
    /// The registry driver name this configuration selects
    pub fn driver_name(&self) -> &str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::Durable { .. } => "durable",
            StoreConfig::Custom { factory, .. } => factory,
        }
    }

    /// Validate the store configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            StoreConfig::Memory => Ok(()),
            StoreConfig::Durable { path } => {
                if path.is_empty() {
                    return Err(Error::config("durable store path cannot be empty"));
                }
                Ok(())
            }
            StoreConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(Error::config("custom store factory cannot be empty"));
                }
                Ok(())
            }
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Memory
    }
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lifetime handed to new reservations, in seconds
    #[serde(default = "default_reservation_ttl_secs")]
    pub reservation_ttl_secs: u64,
}

fn default_reservation_ttl_secs() -> u64 {
    60
}

impl EngineConfig {
    /// Validate the engine settings
    pub fn validate(&self) -> Result<()> {
        if self.reservation_ttl_secs == 0 {
            return Err(Error::config("reservation TTL must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_secs: default_reservation_ttl_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            store: StoreConfig::Memory,
            pool: vec![RangeConfig {
                start: "10.0.0.10".to_string(),
                end: "10.0.0.20".to_string(),
            }],
            engine: EngineConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn empty_pool_is_rejected() {
        let mut config = valid_config();
        config.pool.clear();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn bad_range_is_rejected() {
        let mut config = valid_config();
        config.pool[0].end = "10.0.0.5".to_string();
        assert!(matches!(config.validate(), Err(Error::InvalidRange { .. })));
    }

    #[test]
    fn empty_durable_path_is_rejected() {
        let mut config = valid_config();
        config.store = StoreConfig::Durable {
            path: String::new(),
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn zero_reservation_ttl_is_rejected() {
        let mut config = valid_config();
        config.engine.reservation_ttl_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn store_config_round_trips_through_serde() {
        let config = StoreConfig::Durable {
            path: "/var/lib/leasehold/bindings.redb".to_string(),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "durable");
        assert_eq!(json["path"], "/var/lib/leasehold/bindings.redb");

        let back: StoreConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.driver_name(), "durable");
    }

    #[test]
    fn pool_set_normalizes_ranges() {
        let config = Config {
            store: StoreConfig::Memory,
            pool: vec![
                RangeConfig {
                    start: "10.0.0.1".to_string(),
                    end: "10.0.0.10".to_string(),
                },
                RangeConfig {
                    start: "10.0.0.5".to_string(),
                    end: "10.0.0.20".to_string(),
                },
            ],
            engine: EngineConfig::default(),
        };
        let set = config.pool_set().unwrap();
        assert_eq!(set.ranges().len(), 1);
        assert_eq!(set.num_addresses(), 20);
    }
}
