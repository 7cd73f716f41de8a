use std::{
    env, fs,
    path::{Path, PathBuf},
};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::utils;

const DEFAULT_BIND: &str = "0.0.0.0:3000";
const DEFAULT_TIMEZONE: &str = "America/Chicago";
const DEFAULT_INSTAGRAM: &str = "@TwistedCantina";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unknown timezone {0:?}")]
    Timezone(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub bind: String,
    pub database_path: PathBuf,
    pub timezone: String,
    pub instagram_handle: String,
    pub upload_endpoint: Option<String>,
    pub upload_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            database_path: utils::database_path(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            instagram_handle: DEFAULT_INSTAGRAM.to_string(),
            upload_endpoint: None,
            upload_api_key: None,
        }
    }
}

impl AppConfig {
    /// Reads `path` (or the default config file) and applies `CANTINA_*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(utils::config_path);
        let mut config = read_config(&path)?;
        config.apply_env(|key| env::var(key).ok());
        config.venue_timezone()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("CANTINA_BIND") {
            self.bind = bind;
        }
        if let Some(database) = lookup("CANTINA_DATABASE") {
            self.database_path = PathBuf::from(database);
        }
        if let Some(timezone) = lookup("CANTINA_TIMEZONE") {
            self.timezone = timezone;
        }
        if let Some(handle) = lookup("CANTINA_INSTAGRAM") {
            self.instagram_handle = handle;
        }
        if let Some(endpoint) = lookup("CANTINA_UPLOAD_ENDPOINT") {
            self.upload_endpoint = Some(endpoint);
        }
        if let Some(key) = lookup("CANTINA_UPLOAD_API_KEY") {
            self.upload_api_key = Some(key);
        }
    }

    pub fn venue_timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        info!(?path, "no config file, using defaults");
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
