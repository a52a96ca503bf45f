//! Configuration management for the delta registry
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (delta-schemas.toml)
//! - Environment variables (DELTA_SCHEMAS_*)
//!
//! ## Example config file (delta-schemas.toml):
//! ```toml
//! [store]
//! backend = "file"
//! path = "./deltas"
//!
//! [cache]
//! capacity = 1024
//!
//! [engine]
//! step_budget = 10000
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::engine::TransformationEngine;

/// Main configuration for the delta registry
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    /// Store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Which persistence backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Root directory for the file backend
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached chains
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum evaluation steps per chain application
    #[serde(default = "default_step_budget")]
    pub step_budget: u64,
}

// Default value functions
fn default_store_path() -> PathBuf {
    PathBuf::from("./deltas")
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_step_budget() -> u64 {
    TransformationEngine::DEFAULT_STEP_BUDGET
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: default_store_path(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_budget: default_step_budget(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = [
            "delta-schemas.toml",
            ".delta-schemas.toml",
            "config/delta-schemas.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (DELTA_SCHEMAS_*)
        builder = builder.add_source(
            Environment::with_prefix("DELTA_SCHEMAS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get the store path (resolves relative paths)
    pub fn store_path(&self) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.store.path)
        }
    }
}
