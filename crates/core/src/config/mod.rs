//! Client configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SETTEE_*)
//! 2. TOML config file (if SETTEE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthScheme;

mod validation;

pub use validation::ConfigError;

/// Client configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SETTEE_*)
/// 2. TOML config file (if SETTEE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host name or IP address of the document server.
    ///
    /// Set via SETTEE_HOST environment variable.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port of the document server.
    ///
    /// Set via SETTEE_PORT environment variable.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database that document operations are scoped to.
    ///
    /// Set via SETTEE_DATABASE environment variable.
    #[serde(default)]
    pub database: Option<String>,

    /// Username for authentication. Empty is a valid username.
    ///
    /// Set via SETTEE_USER environment variable.
    #[serde(default)]
    pub user: Option<String>,

    /// Password for authentication. Empty is a valid password.
    ///
    /// Set via SETTEE_PASS environment variable.
    #[serde(default)]
    pub pass: Option<String>,

    /// Authentication scheme (only `basic`).
    #[serde(default)]
    pub auth_scheme: AuthScheme,

    /// Whether response bodies are decoded as JSON.
    ///
    /// Set via SETTEE_DECODE environment variable.
    #[serde(default = "default_true")]
    pub decode: bool,

    /// Connect, write, and read timeout in milliseconds.
    ///
    /// Set via SETTEE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Directory holding disk cache entries. No caching when unset.
    ///
    /// Set via SETTEE_CACHE_DIR environment variable.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Total size budget of the disk cache in bytes.
    #[serde(default = "default_cache_capacity_bytes")]
    pub cache_capacity_bytes: u64,

    /// Lifetime of cached GET responses in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    5984
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_user_agent() -> String {
    "settee/0.1".into()
}

fn default_cache_capacity_bytes() -> u64 {
    10_485_760 // 10MB
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: None,
            user: None,
            pass: None,
            auth_scheme: AuthScheme::Basic,
            decode: true,
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            cache_dir: None,
            cache_capacity_bytes: default_cache_capacity_bytes(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for socket operations.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Lifetime of cached responses as Duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// True when either a user or a password is configured.
    pub fn credentials_configured(&self) -> bool {
        self.user.is_some() || self.pass.is_some()
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SETTEE_`
    /// 2. TOML file from `SETTEE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SETTEE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SETTEE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into()),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Database name, required by document-scoped operations.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no database is configured.
    pub fn require_database(&self) -> Result<&str, ConfigError> {
        self.database.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "database".into(),
            hint: "Set SETTEE_DATABASE environment variable".into(),
        })
    }
}
