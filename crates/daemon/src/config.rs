//! Configuration management for the Homeshare daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/homeshare/config.toml`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("bind must be a socket address such as 127.0.0.1:8080, got {0}")]
    InvalidBind(String),

    #[error("max_entries must be between 1 and 100000, got {0}")]
    InvalidMaxEntries(usize),

    #[error("home_root is not an existing directory: {0}")]
    InvalidHomeRoot(PathBuf),

    #[error("cookie_name must be a non-empty token without separators, got {0:?}")]
    InvalidCookieName(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound for `browse.max_entries`.
const MAX_ENTRIES_LIMIT: usize = 100_000;

/// Main configuration structure for the Homeshare daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// HTTP listener configuration.
    pub server: ServerConfig,

    /// Directory browsing configuration.
    pub browse: BrowseConfig,

    /// Preference session configuration.
    pub session: SessionConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directory for daily rolling log files. Stdout only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: String,
}

/// Directory browsing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrowseConfig {
    /// Root of the served tree. Detected from the environment when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_root: Option<PathBuf>,

    /// Maximum entries per listing, `..` included.
    pub max_entries: usize,

    /// Whether directory contents are listed at all.
    pub allow_listing: bool,
}

/// Preference session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the session cookie.
    pub cookie_name: String,

    /// Seconds of inactivity before a session is dropped (0 = never).
    pub idle_timeout: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            home_root: None,
            max_entries: access::DEFAULT_ENTRY_LIMIT,
            allow_listing: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "homeshare_session".to_string(),
            idle_timeout: 86_400, // 24 hours
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("homeshare")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - HOMESHARE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - HOMESHARE_BIND: Override the listen address
    /// - HOMESHARE_HOME: Override the served home root
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("HOMESHARE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }

        if let Ok(bind) = std::env::var("HOMESHARE_BIND") {
            if !bind.is_empty() {
                tracing::info!("Overriding bind from environment: {}", bind);
                self.server.bind = bind;
            }
        }

        if let Ok(home) = std::env::var("HOMESHARE_HOME") {
            if !home.is_empty() {
                tracing::info!("Overriding home_root from environment: {}", home);
                self.browse.home_root = Some(PathBuf::from(home));
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidBind(self.server.bind.clone()));
        }

        if self.browse.max_entries < 1 || self.browse.max_entries > MAX_ENTRIES_LIMIT {
            return Err(ConfigError::InvalidMaxEntries(self.browse.max_entries));
        }

        if let Some(home) = &self.browse.home_root {
            if !home.is_dir() {
                return Err(ConfigError::InvalidHomeRoot(home.clone()));
            }
        }

        if !is_cookie_token(&self.session.cookie_name) {
            return Err(ConfigError::InvalidCookieName(
                self.session.cookie_name.clone(),
            ));
        }

        Ok(())
    }

    /// Parsed listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.server.bind))
    }

    /// Pick the directory to serve.
    ///
    /// Tries the configured `home_root`, then `$HOME`, then the platform
    /// home directory, then the current directory. The first readable
    /// directory wins.
    pub fn resolve_home_root(&self) -> Result<PathBuf> {
        let candidates = [
            self.browse.home_root.clone(),
            std::env::var_os("HOME")
                .filter(|h| !h.is_empty())
                .map(PathBuf::from),
            dirs::home_dir(),
            std::env::current_dir().ok(),
        ];

        candidates
            .into_iter()
            .flatten()
            .find(|candidate| is_readable_dir(candidate))
            .context("No readable home directory found")
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    ///
    /// The default path is `~/.config/homeshare/config.toml`.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

/// RFC 6265 cookie-name token check.
fn is_cookie_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic()
                && !matches!(
                    b,
                    b'(' | b')' | b'<' | b'>' | b'@' | b',' | b';' | b':' | b'\\' | b'"'
                        | b'/' | b'[' | b']' | b'?' | b'=' | b'{' | b'}'
                )
        })
}

fn is_readable_dir(path: &Path) -> bool {
    path.is_dir() && fs::read_dir(path).is_ok()
}
