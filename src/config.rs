//! Runtime configuration using Figment.
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. An optional TOML file (`--config path`)
//! 3. Environment variables prefixed with `DAQSEQ_` (nested keys use `__`)
//!
//! ```text
//! DAQSEQ_LOG_LEVEL=debug
//! DAQSEQ_STORAGE__OUTPUT_DIR=/data/runs
//! ```
//!
//! # Example file
//!
//! ```toml
//! log_level = "info"
//!
//! [storage]
//! output_dir = "data"
//!
//! [[instruments]]
//! name = "temp_ctrl"
//! kind = "mock"
//! parameters = { setpoint = 20.0 }
//!
//! [[instruments]]
//! name = "clock"
//! kind = "time_keeper"
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    /// Settings parsed but are unusable
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::LoadError(Box::new(err))
    }
}

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Logging level (trace, debug, info, warn, error), used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Storage settings for SAVE_DATA
    #[serde(default)]
    pub storage: StorageSettings,
    /// Instruments placed in the rack at startup
    #[serde(default)]
    pub instruments: Vec<InstrumentDefinition>,
}

/// Storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageSettings {
    /// Base directory for relative SAVE_DATA destinations
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

/// Instrument definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentDefinition {
    /// Rack name used by procedures
    pub name: String,
    /// Which built-in instrument to construct
    pub kind: InstrumentKind,
    /// Initial parameter values (mock only)
    #[serde(default)]
    pub parameters: HashMap<String, f64>,
    /// Fixed value returned by `read_value` (mock only)
    #[serde(default)]
    pub read_value: Option<f64>,
}

/// Built-in instrument types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    /// [`MockInstrument`](crate::instrument::MockInstrument)
    Mock,
    /// [`TimeKeeper`](crate::instrument::TimeKeeper)
    TimeKeeper,
    /// [`RandomGenerator`](crate::instrument::RandomGenerator)
    RandomGenerator,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            storage: StorageSettings::default(),
            instruments: Vec::new(),
        }
    }
}

impl Settings {
    /// Load defaults overlaid with environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// Load defaults, then `path`, then environment variables.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ValidationError(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("DAQSEQ_").split("__"));
        Self::from_figment(figment)
    }

    /// Parse settings from a TOML string, without environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let figment =
            Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(toml));
        Self::from_figment(figment)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Env::prefixed("DAQSEQ_").split("__"))
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that cannot produce a usable rack.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}', expected one of {:?}",
                self.log_level, valid_levels
            )));
        }

        let mut seen = HashSet::new();
        for def in &self.instruments {
            if def.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "Instrument name cannot be empty".to_string(),
                ));
            }
            if !seen.insert(def.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate instrument name '{}'",
                    def.name
                )));
            }
        }
        Ok(())
    }
}
