//! Configuration loading using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (default `config/daq.toml`)
//! 2. environment variables prefixed with `MCCDAQ_`, using `__` between
//!    sections, e.g. `MCCDAQ_BOARD__SAMPLE_RATE_HZ=500`
//!
//! # Example
//! ```no_run
//! use mccdaq::config::DaqConfig;
//!
//! let config = DaqConfig::load()?;
//! config.validate()?;
//! println!("Sampling every {:?}", config.sample_interval());
//! # Ok::<(), mccdaq::DaqError>(())
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, DaqError};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/daq.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaqConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Board selection and timing
    pub board: BoardConfig,
    /// Channel index (as a TOML key) to display name
    #[serde(default)]
    pub channels: BTreeMap<String, String>,
    /// Export settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "MCC DAQ".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Which board to open and how fast to sample it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Board number
    #[serde(default)]
    pub board_id: u32,
    /// Product name to look up in the inventory; overrides `board_id`
    #[serde(default)]
    pub device_name: Option<String>,
    /// Sampling cycles per second
    pub sample_rate_hz: f64,
    /// Acquisition length used by the CLI
    #[serde(default = "default_duration")]
    pub duration_secs: f64,
}

/// CSV export configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Output directory for data files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Keep every n-th row on export
    #[serde(default = "default_downsample")]
    pub downsample: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            downsample: default_downsample(),
        }
    }
}

fn default_duration() -> f64 {
    1.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_downsample() -> usize {
    1
}

impl DaqConfig {
    /// Configuration for `board_id` sampled at `sample_rate_hz`, with no
    /// channels yet.
    pub fn new(board_id: u32, sample_rate_hz: f64) -> Self {
        Self {
            application: ApplicationConfig::default(),
            board: BoardConfig {
                board_id,
                device_name: None,
                sample_rate_hz,
                duration_secs: default_duration(),
            },
            channels: BTreeMap::new(),
            storage: StorageConfig::default(),
        }
    }

    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error by itself; extraction fails only if a
    /// required value (such as `board.sample_rate_hz`) is absent everywhere.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    /// Figment used by [`DaqConfig::load_from`], for callers that want to
    /// merge further providers.
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::default("application", ApplicationConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("MCCDAQ_").split("__"))
    }

    /// Add or replace a channel.
    #[must_use]
    pub fn with_channel(mut self, index: u32, name: impl Into<String>) -> Self {
        self.channels.insert(index.to_string(), name.into());
        self
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let level = self.application.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        let rate = self.board.sample_rate_hz;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "Invalid sample_rate_hz {rate}. Must be greater than 0"
            )));
        }

        let duration = self.board.duration_secs;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "Invalid duration_secs {duration}. Must be greater than 0"
            )));
        }

        if self.storage.downsample == 0 {
            return Err(DaqError::Configuration(
                "Invalid downsample 0. Must be at least 1".to_string(),
            ));
        }

        let map = self.channel_map()?;
        if map.is_empty() {
            return Err(DaqError::InvalidChannelMap(
                "at least one channel is required".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for name in map.values() {
            if name.trim().is_empty() {
                return Err(DaqError::InvalidChannelMap("blank channel name".to_string()));
            }
            if !names.insert(name) {
                return Err(DaqError::InvalidChannelMap(format!(
                    "duplicate channel name '{name}'"
                )));
            }
        }

        Ok(())
    }

    /// Channels keyed by numeric index.
    ///
    /// Fails if a key is not a number or two keys name the same channel
    /// (e.g. `0` and `00`).
    pub fn channel_map(&self) -> AppResult<BTreeMap<u32, String>> {
        let mut map = BTreeMap::new();
        for (key, name) in &self.channels {
            let index: u32 = key.trim().parse().map_err(|_| {
                DaqError::InvalidChannelMap(format!("channel key '{key}' is not a channel number"))
            })?;
            if map.insert(index, name.clone()).is_some() {
                return Err(DaqError::InvalidChannelMap(format!(
                    "channel {index} is configured more than once"
                )));
            }
        }
        Ok(map)
    }

    /// Time between sampling cycles. Zero if the rate is not a positive
    /// finite number.
    pub fn sample_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.board.sample_rate_hz).unwrap_or(Duration::ZERO)
    }

    /// Acquisition length. Zero if `duration_secs` is invalid.
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.board.duration_secs).unwrap_or(Duration::ZERO)
    }
}
