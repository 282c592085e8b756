//! Ledger node configuration.
//!
//! Loaded from environment variables with defaults for a local node.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default root URL of a local ledger node.
pub const DEFAULT_ROOT_URL: &str = "http://localhost:9984";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Where the ledger node lives and how to authenticate to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEndpoint {
    /// Root URL of the node (e.g. "https://test.ipdb.io").
    pub base_url: String,

    /// `app_id` header for hosted networks.
    pub app_id: Option<String>,

    /// `app_key` header for hosted networks.
    pub app_key: Option<String>,
}

impl LedgerEndpoint {
    /// Endpoint without credentials.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            app_id: None,
            app_key: None,
        }
    }

    /// Build a full URL by appending a path to the base URL.
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    /// Check if app credentials are configured.
    pub fn has_auth(&self) -> bool {
        self.app_id.is_some() && self.app_key.is_some()
    }
}

/// Ledger client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub endpoint: LedgerEndpoint,

    /// HTTP request timeout in seconds.
    pub default_timeout_secs: u64,

    /// Extra attempts for idempotent reads.
    pub max_retries: u32,

    /// Whether to verify TLS certificates (disable only for testing).
    pub verify_tls: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            endpoint: LedgerEndpoint::new(DEFAULT_ROOT_URL),
            default_timeout_secs: 30,
            max_retries: 3,
            verify_tls: true,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `LEDGER_ROOT_URL`: node root URL (default: http://localhost:9984)
    /// - `LEDGER_APP_ID`: app id header
    /// - `LEDGER_APP_KEY`: app key header
    /// - `LEDGER_TIMEOUT_SECS`: request timeout in seconds (default: 30)
    /// - `LEDGER_MAX_RETRIES`: read retries (default: 3)
    /// - `LEDGER_VERIFY_TLS`: whether to verify TLS (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();

        let config = Self {
            endpoint: LedgerEndpoint {
                base_url: std::env::var("LEDGER_ROOT_URL").unwrap_or(default.endpoint.base_url),
                app_id: std::env::var("LEDGER_APP_ID").ok(),
                app_key: std::env::var("LEDGER_APP_KEY").ok(),
            },
            default_timeout_secs: parse_var("LEDGER_TIMEOUT_SECS", default.default_timeout_secs)?,
            max_retries: parse_var("LEDGER_MAX_RETRIES", default.max_retries)?,
            verify_tls: std::env::var("LEDGER_VERIFY_TLS")
                .map(|s| s != "false" && s != "0")
                .unwrap_or(default.verify_tls),
        };
        config.validate()?;
        Ok(config)
    }

    /// Get the request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Check values that would make every call fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.endpoint.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "LEDGER_ROOT_URL".to_string(),
                message: format!("'{}' is not an http(s) URL", url),
            });
        }
        if self.default_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LEDGER_TIMEOUT_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.endpoint.app_id.is_some() != self.endpoint.app_key.is_some() {
            let missing = if self.endpoint.app_id.is_none() {
                "LEDGER_APP_ID"
            } else {
                "LEDGER_APP_KEY"
            };
            return Err(ConfigError::MissingEnvVar(missing.to_string()));
        }
        Ok(())
    }
}

/// Parse an optional numeric environment variable.
pub fn parse_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
