//! Configuration handling for gp-okta
//!
//! Everything here can also be given on the command line, which wins.
//! Secrets (password, TOTP key) are never read from this file.

use crate::okta::PushPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const FILE_NAME: &str = "gp-okta.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gateway used when none is given on the command line
    pub gateway: Option<String>,
    pub username: Option<String>,
    /// VPN client binary
    pub client: String,
    /// Value for the client's `--protocol`
    pub protocol: String,
    /// Run the client through sudo
    pub sudo: bool,
    /// Extra arguments appended to the client command line
    pub client_args: Vec<String>,
    pub push: PushConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub interval_ms: u64,
    pub max_polls: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: None,
            username: None,
            client: "openconnect".to_string(),
            protocol: "gp".to_string(),
            sudo: false,
            client_args: Vec::new(),
            push: PushConfig::default(),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        let policy = PushPolicy::default();
        Self {
            interval_ms: policy.interval.as_millis() as u64,
            max_polls: policy.max_polls,
        }
    }
}

impl PushConfig {
    pub fn policy(&self) -> PushPolicy {
        PushPolicy {
            interval: Duration::from_millis(self.interval_ms),
            max_polls: self.max_polls,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load an explicit file, or the first of `./gp-okta.toml` and
    /// `<config dir>/gp-okta/config.toml` that exists, or defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            debug!("Loading config from {}", path.display());
            return Self::load(path);
        }

        for path in Self::search_paths() {
            if path.exists() {
                debug!("Loading config from {}", path.display());
                return Self::load(&path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("gp-okta").join("config.toml"));
        }
        paths
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from(FILE_NAME)
    }
}
