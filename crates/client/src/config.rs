//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CLEMENTINE_API_BASE` - Base URL of the storefront REST backend
//!
//! A `.env` file in the working directory is loaded first if present.
//!
//! ## Optional
//! - `CLEMENTINE_LOCALE` - Locale sent as `Accept-Language` (e.g. `vi-VN`)
//! - `CLEMENTINE_TIMEOUT_SECS` - Per-request timeout in seconds (default: 30)

use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST backend (paths are joined onto this).
    pub api_base: Url,
    /// Active locale, attached to requests as `Accept-Language` when set.
    pub locale: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the base URL.
    #[must_use]
    pub const fn new(api_base: Url) -> Self {
        Self {
            api_base,
            locale: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set the active locale.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `CLEMENTINE_API_BASE` is missing or any variable
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base = require_env("CLEMENTINE_API_BASE")?;
        let api_base: Url = api_base
            .parse()
            .map_err(|e| ConfigError::InvalidEnvVar("CLEMENTINE_API_BASE".into(), format!("{e}")))?;

        let locale = std::env::var("CLEMENTINE_LOCALE")
            .ok()
            .filter(|value| !value.trim().is_empty());

        let timeout_secs = match std::env::var("CLEMENTINE_TIMEOUT_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidEnvVar("CLEMENTINE_TIMEOUT_SECS".into(), format!("{e}"))
            })?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_base,
            locale,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_defaults() {
        let config = ClientConfig::new("https://api.example.com".parse().unwrap());
        assert!(config.locale.is_none());
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn with_locale_sets_locale() {
        let config = ClientConfig::new("https://api.example.com".parse().unwrap())
            .with_locale("vi-VN");
        assert_eq!(config.locale.as_deref(), Some("vi-VN"));
    }
}
