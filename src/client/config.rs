use std::path::{Path, PathBuf};

use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};
use crate::shared::error::Result;

/// Environment variable holding the backend URL
pub const ENV_API_URL: &str = "ZENITH_API_URL";
/// Environment variable holding the project API key
pub const ENV_API_KEY: &str = "ZENITH_API_KEY";
/// Environment variable overriding the data directory
pub const ENV_DATA_DIR: &str = "ZENITH_DATA_DIR";

/// Client configuration wrapper.
#[derive(Debug, Clone)]
pub struct Config {
    app: AppConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env().unwrap_or_else(|e| {
            tracing::warn!("ignoring invalid environment configuration: {}", e);
            Self { app: AppConfig::default() }
        })
    }
}

impl Config {
    /// Create a new configuration from the environment
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_app(app: AppConfig) -> Self {
        Self { app }
    }

    pub fn with_builder(builder: AppConfigBuilder) -> std::result::Result<Self, ConfigError> {
        Ok(Self { app: builder.build()? })
    }

    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::with_builder(env_builder())
    }

    /// Read a TOML file (if given) and let environment variables override it
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                let source = std::fs::read_to_string(path)?;
                AppConfigBuilder::from_toml_str(&source)?
            }
            None => AppConfigBuilder::default(),
        };
        Ok(Self::with_builder(env_builder().or(file))?)
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    pub fn server_url(&self) -> Option<&str> {
        self.app.server_url.as_deref()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.app.api_key.as_deref()
    }

    /// REST endpoint of a table, if a server is configured
    pub fn rest_url(&self, table: &str) -> Option<String> {
        self.server_url().map(|base| format!("{}/rest/v1/{}", base, table))
    }

    /// Location of the local database
    ///
    /// Uses the configured data directory, else the platform data directory.
    pub fn db_path(&self) -> PathBuf {
        let mut path = self
            .app
            .data_dir
            .clone()
            .unwrap_or_else(|| dirs::data_dir().unwrap_or_else(std::env::temp_dir).join("zenith"));
        path.push("local.db");
        path
    }
}

fn env_builder() -> AppConfigBuilder {
    let mut builder = AppConfig::builder();
    if let Ok(url) = std::env::var(ENV_API_URL) {
        builder = builder.server_url(url);
    }
    if let Ok(key) = std::env::var(ENV_API_KEY) {
        builder = builder.api_key(key);
    }
    if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
        builder = builder.data_dir(dir);
    }
    builder
}
