//! TOML-based application configuration.
//!
//! Stores tunables for the realtime layer and the CLI:
//! - Notifier channel capacity
//! - Display tick interval
//! - Watch-mode poll interval
//! - Read retry backoff
//! - Default user identity for the CLI
//!
//! Configuration is stored at `~/.config/studyroom/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

use super::data_dir;

/// Realtime notifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Broadcast channel capacity per room; subscribers that fall further
    /// behind than this see a lag error and must re-fetch.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Local display configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Interval of the cosmetic ticking counter while the timer runs.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

/// `timer watch` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Forced resync interval, so commits from other processes against the
    /// same database file are picked up.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/studyroom/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyroomConfig {
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    /// Backoff before the single retry of a failed state read.
    #[serde(default = "default_read_retry_backoff_ms")]
    pub read_retry_backoff_ms: u64,
    /// Identity used by the CLI when --user is not given.
    #[serde(default)]
    pub default_user: Option<String>,
}

// Default functions
fn default_channel_capacity() -> usize {
    64
}
fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_poll_interval_secs() -> u64 {
    5
}
fn default_read_retry_backoff_ms() -> u64 {
    200
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for StudyroomConfig {
    fn default() -> Self {
        Self {
            notifier: NotifierConfig::default(),
            display: DisplayConfig::default(),
            watch: WatchConfig::default(),
            read_retry_backoff_ms: default_read_retry_backoff_ms(),
            default_user: None,
        }
    }
}

impl StudyroomConfig {
    /// Path of the config file on disk.
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Save to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }
}
