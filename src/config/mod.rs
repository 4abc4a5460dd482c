//! # Configuration Management Module
//!
//! Server settings are read from a TOML file. Every section has defaults, so an
//! empty file (or none at all) yields a runnable configuration.
//!
//! ## Configuration Structure
//!
//! - [`ServerConfig`] - listen address, idle timeout, client tracking bound
//! - [`AuthConfig`] - shared HMAC secret and the environment variable that overrides it
//! - [`StorageConfig`] - reading log path and timestamp zone
//! - [`LoggingConfig`] - log level and optional log files
//!
//! ## Configuration File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 1234
//! idle_timeout_secs = 30
//! max_tracked_clients = 4096
//!
//! [auth]
//! secret_env = "GH_HMAC_KEY"
//! # secret = "..."   # prefer the environment variable
//!
//! [storage]
//! csv_path = "data_log.csv"
//! timestamp_zone = "local"
//!
//! [logging]
//! level = "info"
//! file = "greenhouse-ingest.log"
//! security_file = "greenhouse-ingest-security.log"
//! ```
//!
//! ## Secret precedence
//!
//! Environment variable named by `auth.secret_env` > `auth.secret` > the
//! firmware's factory default key. The factory default only exists so that a
//! fresh bench setup works; startup warns loudly when it is in use.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::sequence::DEFAULT_MAX_TRACKED_CLIENTS;
use crate::storage::TimestampZone;

/// Key compiled into the sensor firmware when nobody sets one in menuconfig.
pub const FACTORY_DEFAULT_SECRET: &str = "change-me-in-menuconfig";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// A connection that stays silent this long is closed.
    pub idle_timeout_secs: u64,
    /// Upper bound on clients remembered by the sequence tracker.
    pub max_tracked_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1234,
            idle_timeout_secs: 30,
            max_tracked_clients: DEFAULT_MAX_TRACKED_CLIENTS,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub secret_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            secret_env: "GH_HMAC_KEY".to_string(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("secret_env", &self.secret_env)
            .finish()
    }
}

/// Where the shared secret came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    Environment(String),
    ConfigFile,
    FactoryDefault,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::Environment(var) => write!(f, "environment variable {}", var),
            SecretSource::ConfigFile => write!(f, "config file"),
            SecretSource::FactoryDefault => write!(f, "factory default"),
        }
    }
}

impl AuthConfig {
    /// Pick the shared secret following the documented precedence. Empty
    /// values are an error rather than a silent fallback.
    pub fn resolve_secret(&self) -> Result<(SecretString, SecretSource)> {
        if !self.secret_env.is_empty() {
            if let Ok(value) = std::env::var(&self.secret_env) {
                if value.is_empty() {
                    bail!("environment variable {} is set but empty", self.secret_env);
                }
                return Ok((
                    SecretString::from(value),
                    SecretSource::Environment(self.secret_env.clone()),
                ));
            }
        }
        match &self.secret {
            Some(s) if s.is_empty() => Err(anyhow!("auth.secret is empty")),
            Some(s) => Ok((SecretString::from(s.clone()), SecretSource::ConfigFile)),
            None => Ok((
                SecretString::from(FACTORY_DEFAULT_SECRET.to_string()),
                SecretSource::FactoryDefault,
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub csv_path: String,
    pub timestamp_zone: TimestampZone,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            csv_path: "data_log.csv".to_string(),
            timestamp_zone: TimestampZone::Local,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    /// Receives records logged under the `security` target (authentication failures).
    pub security_file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            security_file: None,
        }
    }
}

impl LoggingConfig {
    /// Parsed `level`; unknown values fall back to info.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        Self::from_toml_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let content = toml::to_string_pretty(&Config::default())
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            bail!("server.host must not be empty");
        }
        if self.server.idle_timeout_secs == 0 {
            bail!("server.idle_timeout_secs must be at least 1");
        }
        if self.server.max_tracked_clients == 0 {
            bail!("server.max_tracked_clients must be at least 1");
        }
        if self.storage.csv_path.trim().is_empty() {
            bail!("storage.csv_path must not be empty");
        }
        Ok(())
    }
}
