//! Configuration management for edutrack
//!
//! Configuration is loaded from `EDUTRACK_*` environment variables or a TOML
//! file and checked with [`Config::validate`] before use.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// CRM sync configuration
    pub sync: SyncConfig,

    /// API authentication
    pub auth: AuthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind_address: SocketAddr,

    /// Enable permissive CORS
    pub enable_cors: bool,

    /// Enable per-request tracing
    pub enable_request_logging: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// CRM sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Run the periodic sync inside the server
    pub enabled: bool,

    /// CRM API base URL
    pub base_url: String,

    /// Bearer token for the CRM API
    pub api_key: Option<String>,

    /// Seconds between periodic runs
    pub interval_secs: u64,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Retries for transient CRM failures
    pub max_retries: u32,

    /// Seconds a run may hold the sync lease
    pub lease_ttl_secs: u64,
}

/// API authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When disabled every request acts as an admin
    pub enabled: bool,

    /// Bearer token to user id
    pub tokens: HashMap<String, String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

// ============================================================================
// Defaults
// ============================================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            enable_cors: true,
            enable_request_logging: true,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/edutrack.db"),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::from("http://localhost:9000/api"),
            api_key: None,
            interval_secs: 3600,
            request_timeout_secs: 30,
            max_retries: 3,
            lease_ttl_secs: 900,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tokens: HashMap::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::config(format!("{key} has an invalid value '{value}'"))),
        Err(_) => Ok(None),
    }
}

/// Parse `token=user_id` pairs separated by commas
fn parse_tokens(raw: &str) -> Result<HashMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(token, user)| (token.trim().to_string(), user.trim().to_string()))
                .filter(|(token, user)| !token.is_empty() && !user.is_empty())
                .ok_or_else(|| {
                    Error::config(format!("EDUTRACK_AUTH_TOKENS entry '{pair}' is not token=user_id"))
                })
        })
        .collect()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = env_parse("EDUTRACK_BIND_ADDRESS")? {
            config.server.bind_address = addr;
        }
        if let Some(cors) = env_parse("EDUTRACK_ENABLE_CORS")? {
            config.server.enable_cors = cors;
        }
        if let Some(logging) = env_parse("EDUTRACK_REQUEST_LOGGING")? {
            config.server.enable_request_logging = logging;
        }

        if let Ok(path) = std::env::var("EDUTRACK_SQLITE_PATH") {
            config.database.sqlite_path = path.into();
        }

        if let Some(enabled) = env_parse("EDUTRACK_SYNC_ENABLED")? {
            config.sync.enabled = enabled;
        }
        if let Ok(url) = std::env::var("EDUTRACK_CRM_BASE_URL") {
            config.sync.base_url = url;
        }
        config.sync.api_key = std::env::var("EDUTRACK_CRM_API_KEY").ok().filter(|k| !k.is_empty());
        if let Some(secs) = env_parse("EDUTRACK_SYNC_INTERVAL")? {
            config.sync.interval_secs = secs;
        }
        if let Some(secs) = env_parse("EDUTRACK_CRM_TIMEOUT")? {
            config.sync.request_timeout_secs = secs;
        }
        if let Some(retries) = env_parse("EDUTRACK_CRM_MAX_RETRIES")? {
            config.sync.max_retries = retries;
        }
        if let Some(secs) = env_parse("EDUTRACK_SYNC_LEASE_TTL")? {
            config.sync.lease_ttl_secs = secs;
        }

        if let Some(enabled) = env_parse("EDUTRACK_AUTH_ENABLED")? {
            config.auth.enabled = enabled;
        }
        if let Ok(raw) = std::env::var("EDUTRACK_AUTH_TOKENS") {
            config.auth.tokens = parse_tokens(&raw)?;
        }

        if let Ok(level) = std::env::var("EDUTRACK_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("EDUTRACK_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content).map_err(|e| {
            Error::config(format!("Failed to parse TOML config file {}: {e}", path.display()))
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.sync.interval_secs == 0 {
            return Err(Error::config("sync.interval_secs must be greater than 0"));
        }
        if self.sync.request_timeout_secs == 0 {
            return Err(Error::config("sync.request_timeout_secs must be greater than 0"));
        }
        if self.sync.lease_ttl_secs == 0 {
            return Err(Error::config("sync.lease_ttl_secs must be greater than 0"));
        }
        if self.sync.enabled && url::Url::parse(self.sync.base_url.trim()).is_err() {
            return Err(Error::config(format!(
                "sync.base_url '{}' is not a valid URL",
                self.sync.base_url
            )));
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(Error::config(format!(
                "logging.format must be text or json, got '{}'",
                self.logging.format
            )));
        }
        if self.auth.tokens.keys().any(|token| token.trim().is_empty()) {
            return Err(Error::config("auth.tokens contains an empty token"));
        }

        Ok(())
    }

    /// CRM request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.request_timeout_secs)
    }

    /// Interval between periodic sync runs
    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    /// How long one run may hold the sync lease
    #[must_use]
    pub fn lease_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(Duration::from_secs(self.sync.lease_ttl_secs))
            .unwrap_or_else(|_| chrono::Duration::days(365))
    }

    /// Retry policy for CRM requests
    #[must_use]
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new(self.sync.max_retries)
    }
}
