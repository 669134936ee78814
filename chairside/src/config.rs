//! Tunables for every component, loadable from JSON.
//!
//! Every field has a default, so `{}` is a complete configuration.

use serde::{Deserialize, Serialize};

use crate::background::BackgroundConfig;
use crate::cache::CacheConfig;
use crate::interface::{ChairsideError, Result};
use crate::progressive::ProgressiveConfig;
use crate::search::SearchOptions;
use crate::window::WindowConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub search: SearchOptions,
    /// Delay before a typed query is searched
    pub debounce_ms: u64,
    pub cache: CacheConfig,
    pub window: WindowConfig,
    pub progressive: ProgressiveConfig,
    pub background: BackgroundConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            search: SearchOptions::default(),
            debounce_ms: 300,
            cache: CacheConfig::default(),
            window: WindowConfig::default(),
            progressive: ProgressiveConfig::default(),
            background: BackgroundConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Parse and validate
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.max_results == 0 {
            return Err(ChairsideError::InvalidConfig("search.max_results must be at least 1".into()));
        }
        self.cache.validate()?;
        self.progressive.validate()?;
        Ok(())
    }
}
