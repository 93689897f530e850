//! Configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::fetch::{FetcherConfig, ResponseShape};
use crate::storage::{S3Options, StorageConfig};
use crate::sync::DEFAULT_MAX_PAGES;

/// Environment variable overriding `storage.root`.
pub const STORAGE_PATH_ENV: &str = "GAME_STORAGE_PATH";

/// Environment variable overriding `api.base_url`.
pub const BASE_URL_ENV: &str = "AOE4WORLD_BASE_URL";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Upstream API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API root, without the `/players/...` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// `auto`, `array` or `envelope`
    #[serde(default)]
    pub response_shape: ResponseShape,

    /// Stop paginating after this many pages
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_base_url() -> String {
    "https://aoe4world.com/api/v0".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("civ-ledger/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_pages() -> u32 {
    DEFAULT_MAX_PAGES
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
            response_shape: ResponseShape::default(),
            max_pages: default_max_pages(),
        }
    }
}

/// Cache storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Local directory or `s3://bucket/prefix`
    #[serde(default = "default_storage_root")]
    pub root: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_region: Option<String>,

    /// Custom endpoint for S3-compatible stores (R2, MinIO)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_endpoint: Option<String>,
}

fn default_storage_root() -> String {
    "./data".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            s3_region: None,
            s3_endpoint: None,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "*".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub server: ServerConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api: ApiConfig::default(),
            storage: StorageSettings::default(),
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    /// Environment overrides are applied either way.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            debug!("No config file at {:?}, using defaults", path);
            Self::default()
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the environment. `lookup` is `std::env::var` outside tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(STORAGE_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            self.storage.root = root;
        }
        if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = url;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "API timeout must be greater than 0".to_string(),
            ));
        }

        if self.api.max_pages == 0 {
            return Err(ConfigError::ValidationError(
                "max_pages must be greater than 0".to_string(),
            ));
        }

        if reqwest::header::HeaderValue::from_str(&self.api.user_agent).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "API user agent is not a valid header value: {:?}",
                self.api.user_agent
            )));
        }

        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "API base URL is not a valid URL: {}",
                self.api.base_url
            )));
        }

        self.storage_config()
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("storage root: {}", e)))?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "Server port must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            base_url: self.api.base_url.clone(),
            timeout: Duration::from_secs(self.api.timeout_seconds),
            user_agent: self.api.user_agent.clone(),
            response_shape: self.api.response_shape,
        }
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig::new(self.storage.root.clone())
    }

    pub fn s3_options(&self) -> S3Options {
        S3Options {
            region: self.storage.s3_region.clone(),
            endpoint: self.storage.s3_endpoint.clone(),
        }
    }
}
