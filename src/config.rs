//! Configuration loading and persistence.
//!
//! Lifted and generalized from the teacher's `config.rs`: same directory
//! priority chain, same env-override pattern, same 0600-permission save —
//! with the auth/keyring-specific fields removed (no authentication is a
//! Non-goal of this driver).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::PathBuf};

/// Application name used for the platform config directory.
pub const APP_NAME: &str = "neurolink";

/// Configuration for the driver.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// Explicit serial port path override; `None` means enumerate and probe.
    #[serde(default)]
    pub serial_port: Option<String>,
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Directory the rolling CSV log is written into.
    pub log_dir: PathBuf,
    /// Emit `host_timestamp_ms` in CSV records.
    pub debug_log: bool,
    /// Default cadence (`R`): samples between classifier predictions.
    pub sample_rate: u32,
    /// Prediction history capacity (`P`).
    pub prediction_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let log_dir = if cfg!(test) {
            PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                .join("tmp/neurolink-test/logs")
        } else {
            dirs::data_local_dir()
                .map(|d| d.join(APP_NAME).join("logs"))
                .unwrap_or_else(|| PathBuf::from("neurolink-logs"))
        };

        Self {
            serial_port: None,
            baud_rate: crate::constants::BAUD_RATE,
            log_dir,
            debug_log: false,
            sample_rate: crate::constants::DEFAULT_SAMPLE_RATE,
            prediction_capacity: crate::constants::DEFAULT_PREDICTION_CAPACITY,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]`: `tmp/neurolink-test`
    /// 2. `NEUROLINK_CONFIG_DIR` env var: explicit override
    /// 3. Default: platform config dir (`dirs::config_dir()/neurolink`)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/neurolink-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(dir) = std::env::var("NEUROLINK_CONFIG_DIR") {
                    PathBuf::from(dir)
                } else {
                    dirs::config_dir()
                        .ok_or_else(|| Error::Config("could not determine config directory".into()))?
                        .join(APP_NAME)
                }
            }
        };
        fs::create_dir_all(&dir).map_err(Error::Io)?;
        Ok(dir)
    }

    /// Load configuration from file, applying environment variable overrides.
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::load_from_file().unwrap_or_default();
        config.apply_env_overrides();
        config
    }

    fn load_from_file() -> Result<Self> {
        let path = Self::config_dir()?.join("config.json");
        let content = fs::read_to_string(&path).map_err(Error::Io)?;
        serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("NEUROLINK_PORT") {
            self.serial_port = Some(port);
        }
        if let Ok(baud) = std::env::var("NEUROLINK_BAUD") {
            if let Ok(baud) = baud.parse::<u32>() {
                self.baud_rate = baud;
            }
        }
        if let Ok(dir) = std::env::var("NEUROLINK_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Ok(verbosity) = std::env::var("NEUROLINK_LOG_VERBOSITY") {
            self.debug_log = verbosity.eq_ignore_ascii_case("debug");
        }
    }

    /// Persist the configuration to disk with owner-only permissions on unix.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_dir()?.join("config.json");
        let json = serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(&path, json).map_err(Error::Io)?;

        #[cfg(unix)]
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).map_err(Error::Io)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_protocol_defaults() {
        let config = Config::default();
        assert_eq!(config.baud_rate, crate::constants::BAUD_RATE);
        assert_eq!(config.sample_rate, crate::constants::DEFAULT_SAMPLE_RATE);
        assert!(!config.debug_log);
        assert!(config.serial_port.is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut config = Config::default();
        config.baud_rate = 9600;
        config.save().unwrap();

        let loaded = Config::load();
        assert_eq!(loaded.baud_rate, 9600);
    }
}
