//! # Configuration
//!
//! Optional `cregraph.toml`:
//!
//! ```toml
//! [storage]
//! database = "cregraph.redb"
//! backend = "redb"        # or "memory"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! ```
//!
//! Explicit CLI flags override file values, which override these defaults.

use clap::ValueEnum;
use cregraph_core::CregraphError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "cregraph.toml";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Storage backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Disk-backed redb database.
    #[default]
    Redb,
    /// Volatile in-memory store.
    Memory,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Redb => f.write_str("redb"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: PathBuf,
    pub backend: Backend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("cregraph.redb"),
            backend: Backend::Redb,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Full configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self, CregraphError> {
        toml::from_str(text)
            .map_err(|e| CregraphError::DeserializationError(format!("Invalid config: {e}")))
    }

    /// Load `explicit` if given (it must exist), else `cregraph.toml` when
    /// present, else the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, CregraphError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let metadata = std::fs::metadata(&path).map_err(|e| {
            CregraphError::IoError(format!("Cannot read config '{}': {e}", path.display()))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(CregraphError::IoError(format!(
                "Config '{}' exceeds {MAX_CONFIG_FILE_SIZE} bytes",
                path.display()
            )));
        }

        let text = std::fs::read_to_string(&path).map_err(|e| {
            CregraphError::IoError(format!("Cannot read config '{}': {e}", path.display()))
        })?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }
}

// =============================================================================
// TESTS
// =============================================================================
