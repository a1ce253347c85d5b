// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Process configuration: JSON on disk, defaults otherwise.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default cache budget, a little over 4GB.
pub const DEFAULT_CACHE_SIZE: u64 = 4_295_000_000;

/// Host name used when the system one cannot be determined.
const FALLBACK_NAME: &str = "terp";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no path to dump the config to")]
    NoPath,
}

/// A remote replica. Carried in the configuration but not used by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    /// Precedence id
    pub pid: u32,
    pub name: String,
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identifies this host in replica lists
    pub name: String,
    /// Capacity reported to the kernel, in bytes
    pub cache_size: u64,
    /// Minimum log level
    pub level: String,
    pub readonly: bool,
    pub replicas: Vec<Replica>,
    /// Where the configuration was loaded from
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let name = nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| FALLBACK_NAME.to_string());

        Self {
            name,
            cache_size: DEFAULT_CACHE_SIZE,
            level: "info".to_string(),
            readonly: false,
            replicas: Vec::new(),
            path: None,
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file and remember where it came from.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&content)?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Write the configuration as JSON. With no path, writes back to the
    /// file it was loaded from.
    pub fn dump(&self, path: Option<&Path>) -> Result<(), ConfigError> {
        let target = match path {
            Some(path) => path,
            None => self.path.as_deref().ok_or(ConfigError::NoPath)?,
        };
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(target, data)?;
        Ok(())
    }
}
