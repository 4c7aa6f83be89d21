//! User configuration loaded from `config.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sessionkit_core::HealthPolicy;
use tracing::{debug, info};

use crate::error::{Result, ServiceError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub health: HealthPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Worker threads; 0 means one per available core
    pub jobs: usize,
    pub extensions: Vec<String>,
    pub skip_backups: bool,
    pub recursive: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            jobs: 0,
            extensions: vec!["als".to_string()],
            skip_backups: true,
            recursive: true,
        }
    }
}

/// Default location: `<config dir>/sessionkit/config.toml`
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sessionkit")
        .join("config.toml")
}

impl Config {
    /// Load from `path`, or from [`config_path`] when none is given.
    ///
    /// A missing file yields the defaults; a file that exists but does not
    /// parse is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(ServiceError::Read { path, source }),
        };
        let config: Self = toml::from_str(&text).map_err(|e| ServiceError::Config {
            path: path.clone(),
            message: e.to_string(),
        })?;
        info!(path = %path.display(), policy = %config.health.version, "Loaded config");
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ServiceError::Config {
            path: config_path(),
            message: e.to_string(),
        })
    }
}
