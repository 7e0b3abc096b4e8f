//! Simulation settings, stored as TOML.
//!
//! ```toml
//! tick_rate = 30.0
//! log_filter = "info,sim_backend=debug"
//!
//! [runtime]
//! worker_threads = 1
//!
//! [archetypes]
//! Player = ["Stats", "States", "Modifiers", "Movement"]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_FILE: &str = "sim.toml";

/// Errors that can occur while reading or writing settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Target ticks per second of the update loop
    pub tick_rate: f32,
    /// Default `tracing` filter, overridden by `RUST_LOG`
    pub log_filter: String,
    pub runtime: RuntimeConfig,
    /// Archetype name to component names
    pub archetypes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// `1` runs everything on a single-threaded scheduler
    pub worker_threads: usize,
    pub thread_name: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30.0,
            log_filter: "info".to_string(),
            runtime: RuntimeConfig::default(),
            archetypes: BTreeMap::new(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: 1,
            thread_name: "sim-runtime".to_string(),
        }
    }
}

impl SimConfig {
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Load `path`. When the file does not exist the defaults are written there
    /// and returned; failing to write them is only logged.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load(path);
        }

        tracing::info!("Config file not found at {}, using defaults", path.display());
        let config = Self::default();
        if let Err(e) = config.save(path) {
            tracing::warn!("Failed to write default config: {}", e);
        }
        Ok(config)
    }

    /// Write the settings to `path`, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, self.to_toml()?).map_err(io_err)
    }

    /// Per-user config location, if the platform has one
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "SimBackend", "sim_backend")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }
}
