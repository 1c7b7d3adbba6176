//! Configuration management for the CLI
//!
//! This module handles loading and merging configuration from:
//! - Default values
//! - Configuration files (YAML/JSON/TOML)
//! - `.env` files and `COURIER_*` environment variables

use crate::error::{Error, Result};
use courier_core::DispatcherConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dispatcher settings: timeouts, pool limits, TLS, user agent
    pub dispatcher: DispatcherConfig,

    /// Headers added to every request sent from the CLI
    pub headers: BTreeMap<String, String>,

    /// File this configuration was read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path)?;

        let mut config: Config = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        config.source = Some(path.to_path_buf());

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        for path in Self::default_config_paths() {
            if path.exists() {
                match Self::from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to load config, trying next location"
                        );
                    }
                }
            }
        }

        // Return default config if no config file found
        Ok(Self::default())
    }

    /// Load configuration from a specific file or default locations, then
    /// apply environment overrides
    pub fn load_with_file(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::load()?,
        };

        debug!(source = ?config.source, "Applying environment overrides");
        config.dispatcher = config.dispatcher.merge_with_env()?;

        Ok(config)
    }

    /// Get default configuration file paths to check
    pub fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            // Current directory
            PathBuf::from(".courier.toml"),
            PathBuf::from(".courier.yaml"),
            PathBuf::from(".courier.json"),
        ];

        // User config directory
        if let Some(config_dir) = dirs::config_dir() {
            let courier_dir = config_dir.join("courier");
            paths.push(courier_dir.join("config.toml"));
            paths.push(courier_dir.join("config.yaml"));
            paths.push(courier_dir.join("config.json"));
        }

        // Home directory
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".courier.toml"));
            paths.push(home_dir.join(".courier.yaml"));
        }

        paths
    }

    /// Validate the dispatcher settings
    pub fn validate(&self) -> Result<()> {
        self.dispatcher.validate()?;

        for name in self.headers.keys() {
            if name.trim().is_empty() || name.contains(char::is_whitespace) {
                return Err(Error::config(format!("Invalid header name '{}'", name)));
            }
        }

        Ok(())
    }
}
