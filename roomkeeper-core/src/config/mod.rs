//! Configuration management for roomkeeper
//!
//! Defaults, a TOML file format and `ROOMKEEPER_<SECTION>_<KEY>` environment
//! overrides, all checked by [`Config::validate`].

use crate::core_room::listing::{SortKey, SortOrder};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read roomkeeper config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write roomkeeper config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed roomkeeper config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot encode roomkeeper config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("invalid roomkeeper config: {0}")]
    Invalid(String),
}

/// Path that selects a private in-memory database
pub const MEMORY_DATABASE: &str = ":memory:";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Room store configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Room listing defaults
    pub listing: ListingConfig,

    /// Session token configuration
    pub session: SessionConfig,
}

/// Room store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file, or `:memory:`
    pub database_path: PathBuf,

    /// Maximum pooled connections
    pub pool_size: u32,

    /// How long a writer waits on a locked database
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn is_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_DATABASE
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

/// Room listing defaults, applied when a query leaves a field out
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    pub default_sort: String,
    pub default_order: String,
    pub default_page_size: usize,
    /// Requested page sizes above this are clamped
    pub max_page_size: usize,
}

/// Session token configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Token lifetime; unset means tokens live until revoked
    #[serde(with = "humantime_serde")]
    pub token_ttl: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./roomkeeper.db"),
            pool_size: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_sort: "peopleNum".to_string(),
            default_order: "desc".to_string(),
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

fn parse_var<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        reason: e.to_string(),
    })
}

fn parse_duration(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    humantime_serde::re::humantime::parse_duration(raw.trim()).map_err(|e| {
        ConfigError::InvalidValue {
            key,
            reason: e.to_string(),
        }
    })
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: ROOMKEEPER_<SECTION>_<KEY>
    /// Example: ROOMKEEPER_STORE_DATABASE_PATH=/var/lib/roomkeeper.db
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] over an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Store config
        if let Some(path) = lookup("ROOMKEEPER_STORE_DATABASE_PATH") {
            self.store.database_path = PathBuf::from(path);
        }
        if let Some(size) = lookup("ROOMKEEPER_STORE_POOL_SIZE") {
            self.store.pool_size = parse_var("ROOMKEEPER_STORE_POOL_SIZE", &size)?;
        }
        if let Some(timeout) = lookup("ROOMKEEPER_STORE_BUSY_TIMEOUT") {
            self.store.busy_timeout = parse_duration("ROOMKEEPER_STORE_BUSY_TIMEOUT", &timeout)?;
        }

        // Logging config
        if let Some(level) = lookup("ROOMKEEPER_LOG_LEVEL") {
            self.logging.level = level.trim().to_lowercase();
        }
        if let Some(json) = lookup("ROOMKEEPER_LOG_JSON") {
            self.logging.json_format = parse_var("ROOMKEEPER_LOG_JSON", &json)?;
        }

        // Listing config
        if let Some(sort) = lookup("ROOMKEEPER_LISTING_DEFAULT_SORT") {
            self.listing.default_sort = sort;
        }
        if let Some(order) = lookup("ROOMKEEPER_LISTING_DEFAULT_ORDER") {
            self.listing.default_order = order;
        }
        if let Some(size) = lookup("ROOMKEEPER_LISTING_DEFAULT_PAGE_SIZE") {
            self.listing.default_page_size =
                parse_var("ROOMKEEPER_LISTING_DEFAULT_PAGE_SIZE", &size)?;
        }
        if let Some(size) = lookup("ROOMKEEPER_LISTING_MAX_PAGE_SIZE") {
            self.listing.max_page_size = parse_var("ROOMKEEPER_LISTING_MAX_PAGE_SIZE", &size)?;
        }

        // Session config
        if let Some(ttl) = lookup("ROOMKEEPER_SESSION_TOKEN_TTL") {
            self.session.token_ttl = Some(parse_duration("ROOMKEEPER_SESSION_TOKEN_TTL", &ttl)?);
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Load a file, then apply overrides from `lookup`
    pub fn from_file_and_lookup<F>(path: impl AsRef<Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate store config
        if self.store.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "database_path must not be empty".to_string(),
            ));
        }
        if self.store.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "pool_size must be greater than 0".to_string(),
            ));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        // Validate listing config
        if self.listing.default_sort.parse::<SortKey>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "Invalid default sort: {}",
                self.listing.default_sort
            )));
        }
        if self.listing.default_order.parse::<SortOrder>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "Invalid default order: {}",
                self.listing.default_order
            )));
        }
        if self.listing.default_page_size == 0 || self.listing.max_page_size == 0 {
            return Err(ConfigError::Invalid(
                "page sizes must be greater than 0".to_string(),
            ));
        }
        if self.listing.default_page_size > self.listing.max_page_size {
            return Err(ConfigError::Invalid(
                "default_page_size exceeds max_page_size".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }
}
