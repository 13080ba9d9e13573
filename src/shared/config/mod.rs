//! Application configuration module
//!
//! Provides the validated configuration shared by the queue, the processor
//! and the remote client, plus TOML file support.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default bound on a single remote call
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default number of permanent failures before an entry is dead-lettered
pub const DEFAULT_DEAD_LETTER_AFTER: u32 = 5;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the hosted backend
    pub server_url: Option<String>,
    /// Project API key sent with every request
    pub api_key: Option<String>,
    /// Directory holding the local database
    pub data_dir: Option<PathBuf>,
    /// Upper bound on a single remote call
    pub remote_timeout: Duration,
    /// Permanent failures tolerated before an entry is dead-lettered
    pub dead_letter_after: u32,
    /// Also merge consecutive UPDATEs to the same remote record
    pub coalesce_updates: bool,
    /// Queue every mutation instead of sending it directly
    pub queue_first: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            data_dir: None,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            dead_letter_after: DEFAULT_DEAD_LETTER_AFTER,
            coalesce_updates: false,
            queue_first: false,
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.server_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }
        if self.dead_letter_after == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dead_letter_after",
                message: "must be at least 1".to_string(),
            });
        }
        if self.remote_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "remote_timeout",
                message: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Parse a TOML document; absent keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        AppConfigBuilder::from_toml_str(source)?.build()
    }
}

/// On-disk shape of the configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    server_url: Option<String>,
    api_key: Option<String>,
    data_dir: Option<PathBuf>,
    remote_timeout_secs: Option<u64>,
    dead_letter_after: Option<u32>,
    coalesce_updates: Option<bool>,
    queue_first: Option<bool>,
}

impl FileConfig {
    fn into_builder(self) -> AppConfigBuilder {
        let mut builder = AppConfigBuilder::default();
        builder.server_url = self.server_url;
        builder.api_key = self.api_key;
        builder.data_dir = self.data_dir;
        builder.remote_timeout = self.remote_timeout_secs.map(Duration::from_secs);
        builder.dead_letter_after = self.dead_letter_after;
        builder.coalesce_updates = self.coalesce_updates;
        builder.queue_first = self.queue_first;
        builder
    }
}

/// Builder for AppConfig
#[derive(Debug, Default, Clone)]
pub struct AppConfigBuilder {
    server_url: Option<String>,
    api_key: Option<String>,
    data_dir: Option<PathBuf>,
    remote_timeout: Option<Duration>,
    dead_letter_after: Option<u32>,
    coalesce_updates: Option<bool>,
    queue_first: Option<bool>,
}

impl AppConfigBuilder {
    /// Builder pre-filled from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(file.into_builder())
    }

    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Set the API key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the data directory
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = Some(timeout);
        self
    }

    pub fn dead_letter_after(mut self, failures: u32) -> Self {
        self.dead_letter_after = Some(failures);
        self
    }

    pub fn coalesce_updates(mut self, enabled: bool) -> Self {
        self.coalesce_updates = Some(enabled);
        self
    }

    pub fn queue_first(mut self, enabled: bool) -> Self {
        self.queue_first = Some(enabled);
        self
    }

    /// Fill unset fields from another builder (used for env overrides)
    pub fn or(mut self, fallback: AppConfigBuilder) -> Self {
        self.server_url = self.server_url.or(fallback.server_url);
        self.api_key = self.api_key.or(fallback.api_key);
        self.data_dir = self.data_dir.or(fallback.data_dir);
        self.remote_timeout = self.remote_timeout.or(fallback.remote_timeout);
        self.dead_letter_after = self.dead_letter_after.or(fallback.dead_letter_after);
        self.coalesce_updates = self.coalesce_updates.or(fallback.coalesce_updates);
        self.queue_first = self.queue_first.or(fallback.queue_first);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            server_url: self.server_url.map(|url| url.trim_end_matches('/').to_string()),
            api_key: self.api_key,
            data_dir: self.data_dir,
            remote_timeout: self.remote_timeout.unwrap_or(defaults.remote_timeout),
            dead_letter_after: self.dead_letter_after.unwrap_or(defaults.dead_letter_after),
            coalesce_updates: self.coalesce_updates.unwrap_or(defaults.coalesce_updates),
            queue_first: self.queue_first.unwrap_or(defaults.queue_first),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
    #[error("failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = AppConfig::builder().build().unwrap();
        assert_eq!(config.remote_timeout, DEFAULT_REMOTE_TIMEOUT);
        assert_eq!(config.dead_letter_after, DEFAULT_DEAD_LETTER_AFTER);
        assert!(!config.coalesce_updates);
        assert!(!config.queue_first);
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let config = AppConfig::builder()
            .server_url("https://project.example.co/")
            .build()
            .unwrap();
        assert_eq!(config.server_url.as_deref(), Some("https://project.example.co"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = AppConfig::builder().server_url("ftp://nope").build();
        assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_zero_dead_letter_threshold_rejected() {
        let result = AppConfig::builder().dead_letter_after(0).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "dead_letter_after", .. })
        ));
    }

    #[test]
    fn test_from_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            server_url = "https://abc.example.co"
            remote_timeout_secs = 3
            coalesce_updates = true
            "#,
        )
        .unwrap();
        assert_eq!(config.server_url.as_deref(), Some("https://abc.example.co"));
        assert_eq!(config.remote_timeout, Duration::from_secs(3));
        assert!(config.coalesce_updates);
        assert_eq!(config.dead_letter_after, DEFAULT_DEAD_LETTER_AFTER);
    }

    #[test]
    fn test_from_toml_unknown_key() {
        let result = AppConfig::from_toml_str("colour = \"blue\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_builder_or_prefers_self() {
        let primary = AppConfig::builder().api_key("file-key");
        let fallback = AppConfig::builder().api_key("env-key").queue_first(true);
        let config = primary.or(fallback).build().unwrap();
        assert_eq!(config.api_key.as_deref(), Some("file-key"));
        assert!(config.queue_first);
    }
}
