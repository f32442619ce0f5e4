//! Configuration management for the model cache.
//!
//! Provides layered configuration loading with priority:
//! 1. Default values (hardcoded)
//! 2. Optional TOML file
//! 3. Environment variables (highest priority, `FLEET_CACHE__` prefix)
//!

mod hub;
mod stream;
mod watcher;
pub use hub::*;
pub use stream::*;
pub use watcher::*;


//---
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Environment variable prefix for overrides, e.g.
/// `FLEET_CACHE__HUB__SUBSCRIBER_QUEUE_SIZE=64`.
pub const ENV_PREFIX: &str = "FLEET_CACHE";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CacheSettings {
    /// Structural-change broker settings
    #[serde(default)]
    pub hub: HubConfig,
    /// Watcher registry settings
    #[serde(default)]
    pub watcher: WatcherConfig,
    /// Upstream change feed settings
    #[serde(default)]
    pub stream: StreamConfig,
}

impl CacheSettings {
    /// Load configuration from multiple sources with priority:
    /// 1. Hardcoded defaults
    /// 2. Optional config file
    /// 3. Environment variables
    ///
    /// The merged result is validated before it is returned.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            config = config.add_source(File::with_name(path).required(true));
        }

        config = config.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Self = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.hub.validate()?;
        self.watcher.validate()?;
        self.stream.validate()?;
        Ok(())
    }
}
