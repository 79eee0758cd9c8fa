//! Client configuration.
//!
//! ## Environment Variables
//! - `PETS_API_BASE_URL`: API root, default `http://localhost:3000`
//! - `PETS_STORAGE_DIR`: directory for persisted session/filter state,
//!   default `.pets-client`
//! - `PETS_REQUEST_TIMEOUT_SECS`: transport timeout in seconds, default 30;
//!   `0` disables the timeout
//!
//! A JSON file with the same settings (`baseUrl`, `storageDir`,
//! `requestTimeoutSecs`) can be loaded with [`ClientConfig::from_file`];
//! missing fields take their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_STORAGE_DIR: &str = ".pets-client";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub storage_dir: PathBuf,
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            request_timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    storage_dir: Option<PathBuf>,
    request_timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup; unset variables keep their
    /// defaults.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(base_url) = lookup("PETS_API_BASE_URL") {
            config.base_url = validate_base_url(base_url)?;
        }
        if let Some(dir) = lookup("PETS_STORAGE_DIR") {
            config.storage_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("PETS_REQUEST_TIMEOUT_SECS") {
            let secs = secs.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                name: "PETS_REQUEST_TIMEOUT_SECS",
                reason: e.to_string(),
            })?;
            config.request_timeout = timeout(secs);
        }
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let file: FileConfig = serde_json::from_str(&raw)?;

        let mut config = Self::default();
        if let Some(base_url) = file.base_url {
            config.base_url = validate_base_url(base_url)?;
        }
        if let Some(dir) = file.storage_dir {
            config.storage_dir = dir;
        }
        if let Some(secs) = file.request_timeout_secs {
            config.request_timeout = timeout(secs);
        }
        Ok(config)
    }
}

fn timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn validate_base_url(raw: String) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        name: "base URL",
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            name: "base URL",
            reason: format!("unsupported scheme {}", parsed.scheme()),
        });
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}
