//! Client configuration loaded from `lifequest.toml`.

use lifequest_core::LevelCurve;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "lifequest.toml";

/// Minimum spacing between two autosave writes, in seconds.
pub const DEFAULT_DEBOUNCE_SECS: u64 = 5;

/// Periodic autosave tick, in seconds.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    pub enabled: bool,
    pub debounce_secs: u64,
    pub interval_secs: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_secs: DEFAULT_DEBOUNCE_SECS,
            interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl AutoSaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    /// Interval tick; never zero.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Seed for backoff jitter, so retry timing is reproducible.
    pub jitter_seed: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 250,
            max_delay_ms: 8_000,
            jitter_seed: 42,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    pub level_curve: LevelCurve,
}

/// Top-level client configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Directory holding slot save files.
    pub save_dir: PathBuf,
    /// Optional quest catalog overriding the built-in one.
    pub catalog_path: Option<PathBuf>,
    pub autosave: AutoSaveConfig,
    pub retry: RetryConfig,
    pub progression: ProgressionConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("saves"),
            catalog_path: None,
            autosave: AutoSaveConfig::default(),
            retry: RetryConfig::default(),
            progression: ProgressionConfig::default(),
        }
    }
}

impl GameConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load from `path`; a missing or invalid file yields the defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(text) => match Self::from_toml_str(&text) {
                Ok(cfg) => {
                    info!("Loaded config from {}", path.display());
                    cfg
                }
                Err(e) => {
                    warn!("Failed to parse config file: {e}");
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config file: {e}");
                Self::default()
            }
        }
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, contents)
    }
}
