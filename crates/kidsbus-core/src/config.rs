//! Console configuration management.
//!
//! This module handles loading and saving the console configuration: the
//! remote store endpoint, the optional location service endpoints, and the
//! polling and timeout periods.
//!
//! Configuration is stored at `~/.config/kidsbus/config.json`. Environment
//! variables override the file:
//!
//! | variable | field |
//! |---|---|
//! | `KIDSBUS_STORE_URL` | `store_url` |
//! | `KIDSBUS_STORE_TOKEN` | `store_token` |
//! | `KIDSBUS_PRIMARY_LOCATION_URL` | `primary_location_url` |
//! | `KIDSBUS_GPS_URL` | `gps_url` |
//! | `KIDSBUS_TRACKING_INTERVAL_SECS` | `tracking_interval_secs` |
//! | `KIDSBUS_LOAD_TIMEOUT_SECS` | `load_timeout_secs` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::console::{ConsoleSettings, DEFAULT_LOAD_TIMEOUT_SECS};
use crate::location::DEFAULT_TRACKING_INTERVAL_SECS;

/// Application name used for config directory paths
const APP_NAME: &str = "kidsbus";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store_url: Option<String>,
    /// Bearer token for the store. Prefer the environment over the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_token: Option<String>,
    pub primary_location_url: Option<String>,
    pub gps_url: Option<String>,
    pub tracking_interval_secs: u64,
    pub load_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_url: None,
            store_token: None,
            primary_location_url: None,
            gps_url: None,
            tracking_interval_secs: DEFAULT_TRACKING_INTERVAL_SECS,
            load_timeout_secs: DEFAULT_LOAD_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load from the config file, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).with_context(|| format!("Invalid config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply overrides from `lookup`, normally the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let seconds = |key: &str| -> Result<Option<u64>> {
            match text(key) {
                Some(value) => {
                    let secs: u64 = value
                        .parse()
                        .with_context(|| format!("{} must be a whole number of seconds, got {:?}", key, value))?;
                    anyhow::ensure!(secs > 0, "{} must be greater than zero", key);
                    Ok(Some(secs))
                }
                None => Ok(None),
            }
        };

        if let Some(url) = text("KIDSBUS_STORE_URL") {
            self.store_url = Some(url);
        }
        if let Some(token) = text("KIDSBUS_STORE_TOKEN") {
            self.store_token = Some(token);
        }
        if let Some(url) = text("KIDSBUS_PRIMARY_LOCATION_URL") {
            self.primary_location_url = Some(url);
        }
        if let Some(url) = text("KIDSBUS_GPS_URL") {
            self.gps_url = Some(url);
        }
        if let Some(secs) = seconds("KIDSBUS_TRACKING_INTERVAL_SECS")? {
            self.tracking_interval_secs = secs;
        }
        if let Some(secs) = seconds("KIDSBUS_LOAD_TIMEOUT_SECS")? {
            self.load_timeout_secs = secs;
        }
        Ok(())
    }

    pub fn tracking_interval(&self) -> Duration {
        Duration::from_secs(self.tracking_interval_secs.max(1))
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn settings(&self) -> ConsoleSettings {
        ConsoleSettings {
            load_timeout: self.load_timeout(),
            tracking_interval: self.tracking_interval(),
        }
    }
}
