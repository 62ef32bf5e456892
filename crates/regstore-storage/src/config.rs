use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for a generic store and its in-memory backend.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Queue capacity of every watch session opened on the store.
    pub watch_queue_capacity: usize,
    /// Number of changes the backend retains for watch resume and
    /// continued lists.
    pub history_capacity: usize,
    /// Upper bound applied to a list `limit`.
    pub max_page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            watch_queue_capacity: 100,
            history_capacity: 1000,
            max_page_size: 500,
        }
    }
}

impl StoreConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch_queue_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "watch_queue_capacity",
            });
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "history_capacity",
            });
        }
        if self.max_page_size == 0 {
            return Err(ConfigError::Zero {
                field: "max_page_size",
            });
        }
        Ok(())
    }
}
