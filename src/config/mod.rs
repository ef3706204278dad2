//! Configuration management
//!
//! Configuration is read from `config.yml` (or the path in
//! `PENNYWISE_CONFIG`) and then overridden by `PENNYWISE_*` environment
//! variables. Anything missing gets a default, so a fresh install runs with
//! no config file at all.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "PENNYWISE_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Add the `Secure` attribute to session cookies (enable behind HTTPS)
    #[serde(default)]
    pub secure_cookie: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure_cookie: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL or SQLite file path
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

impl DatabaseConfig {
    /// Build a config from a bare URL, picking the driver from its scheme.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            driver: DatabaseDriver::from_url(&url),
            url,
        }
    }
}

pub fn default_database_url() -> String {
    "data/expenses.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

impl DatabaseDriver {
    /// `mysql://` URLs select MySQL; everything else is treated as SQLite.
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("mysql://") {
            DatabaseDriver::Mysql
        } else {
            DatabaseDriver::Sqlite
        }
    }
}

/// Session lifetime and housekeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Full session lifetime; renewal happens once less than half remains
    #[serde(default = "default_duration_days")]
    pub duration_days: i64,
    /// How often expired sessions are swept from the store
    #[serde(default = "default_cleanup_interval_minutes")]
    pub cleanup_interval_minutes: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_days: default_duration_days(),
            cleanup_interval_minutes: default_cleanup_interval_minutes(),
        }
    }
}

impl SessionConfig {
    pub fn duration(&self) -> Duration {
        Duration::days(self.duration_days)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_minutes.max(1) * 60)
    }
}

fn default_duration_days() -> i64 {
    30
}

fn default_cleanup_interval_minutes() -> u64 {
    60
}

/// First-run account. Used only while the users table is empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub admin_user: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

impl BootstrapConfig {
    /// Both credentials, when both are present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.admin_user.as_deref(), self.admin_password.as_deref()) {
            (Some(user), Some(password)) if !user.trim().is_empty() && !password.is_empty() => {
                Some((user, password))
            }
            _ => None,
        }
    }
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Config file location: `PENNYWISE_CONFIG` or `config.yml`.
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.yml"))
    }

    /// Load configuration from file.
    ///
    /// A missing or empty file yields the defaults. Invalid YAML is an error
    /// that names the line and column.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file, apply environment overrides and validate.
    ///
    /// Recognised variables:
    /// - PENNYWISE_SERVER_HOST / PENNYWISE_SERVER_PORT / PENNYWISE_SERVER_SECURE_COOKIE
    /// - PENNYWISE_DATABASE_DRIVER / PENNYWISE_DATABASE_URL
    /// - PENNYWISE_SESSION_DURATION_DAYS / PENNYWISE_SESSION_CLEANUP_INTERVAL_MINUTES
    /// - PENNYWISE_ADMIN_USER / PENNYWISE_ADMIN_PASSWORD
    pub fn load_with_env(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.duration_days <= 0 {
            return Err(ConfigError::ValidationError(
                "session.duration_days must be positive".to_string(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Invalid values are ignored and the file/default value stays.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("PENNYWISE_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PENNYWISE_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(secure) = std::env::var("PENNYWISE_SERVER_SECURE_COOKIE") {
            if let Some(secure) = parse_bool(&secure) {
                self.server.secure_cookie = secure;
            }
        }

        if let Ok(driver) = std::env::var("PENNYWISE_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("PENNYWISE_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(days) = std::env::var("PENNYWISE_SESSION_DURATION_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                self.session.duration_days = days;
            }
        }
        if let Ok(minutes) = std::env::var("PENNYWISE_SESSION_CLEANUP_INTERVAL_MINUTES") {
            if let Ok(minutes) = minutes.parse::<u64>() {
                self.session.cleanup_interval_minutes = minutes;
            }
        }

        if let Ok(user) = std::env::var("PENNYWISE_ADMIN_USER") {
            self.bootstrap.admin_user = Some(user);
        }
        if let Ok(password) = std::env::var("PENNYWISE_ADMIN_PASSWORD") {
            self.bootstrap.admin_password = Some(password);
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Format YAML parsing error with location
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Tests that touch process environment share this lock.
#[cfg(test)]
pub(crate) static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
