//! Configuration management for the checkout.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors in configuration values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `BACKEND_URL` is not an absolute http(s) URL
    #[error("Invalid backend URL {url:?}: {reason}")]
    InvalidBackendUrl {
        /// The configured value
        url: String,
        /// What was wrong with it
        reason: String,
    },

    /// `BACKEND_TIMEOUT_SECS` is zero
    #[error("Backend timeout must be at least one second")]
    ZeroTimeout,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ticketing backend
    pub backend: BackendConfig,
    /// Session persistence
    pub session: SessionConfig,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
}

/// Ticketing backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// API root, e.g. `http://localhost:8001/api`
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl BackendConfig {
    /// Per-request timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Session persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// File the session is kept in between runs
    pub file: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable values fall back to their defaults; call
    /// [`Config::validate`] before using the result.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            backend: BackendConfig {
                base_url: env::var("BACKEND_URL")
                    .unwrap_or_else(|_| "http://localhost:8001/api".to_string()),
                timeout_secs: env::var("BACKEND_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            },
            session: SessionConfig {
                file: env::var("SESSION_FILE")
                    .map_or_else(|_| PathBuf::from(".checkout-session.json"), PathBuf::from),
            },
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Checks values that cannot be defaulted away
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a malformed backend URL or a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.backend.base_url).map_err(|e| {
            ConfigError::InvalidBackendUrl {
                url: self.backend.base_url.clone(),
                reason: e.to_string(),
            }
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBackendUrl {
                url: self.backend.base_url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        if self.backend.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(())
    }
}
