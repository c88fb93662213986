//! Configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::fetch::{FetcherConfig, RetryPolicy};
use crate::options::DEFAULT_RANGE_NAMESPACE;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Remote client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_web_base_url")]
    pub web_base_url: String,

    #[serde(default = "default_open_base_url")]
    pub open_base_url: String,

    /// Service key for the open endpoint
    #[serde(default)]
    pub open_api_key: Option<String>,

    /// Environment variable holding the session token
    #[serde(default = "default_token_env")]
    pub session_token_env: String,

    #[serde(default = "default_game")]
    pub game: String,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    /// Zero disables negative caching
    #[serde(default = "default_negative_ttl")]
    pub negative_ttl_seconds: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_backoff")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_web_base_url() -> String {
    "https://api.faceit.com".to_string()
}

fn default_open_base_url() -> String {
    "https://open.faceit.com/data/v4".to_string()
}

fn default_token_env() -> String {
    "MATCHROOM_SESSION_TOKEN".to_string()
}

fn default_game() -> String {
    "cs2".to_string()
}

fn default_cache_ttl() -> u64 {
    60 * 60
}

fn default_negative_ttl() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    500
}

fn default_backoff() -> f64 {
    2.0
}

fn default_timeout() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            web_base_url: default_web_base_url(),
            open_base_url: default_open_base_url(),
            open_api_key: None,
            session_token_env: default_token_env(),
            game: default_game(),
            cache_ttl_seconds: default_cache_ttl(),
            negative_ttl_seconds: default_negative_ttl(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
            backoff_multiplier: default_backoff(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl ClientConfig {
    pub fn to_fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            web_base_url: self.web_base_url.clone(),
            open_base_url: self.open_base_url.clone(),
            web_token: None,
            open_api_key: self.open_api_key.clone(),
            cache_ttl: Duration::from_secs(self.cache_ttl_seconds),
            negative_ttl: Duration::from_secs(self.negative_ttl_seconds),
            timeout: Duration::from_secs(self.timeout_seconds),
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                initial_delay: Duration::from_millis(self.retry_delay_ms),
                backoff_multiplier: self.backoff_multiplier,
            },
            ..FetcherConfig::default()
        }
    }
}

/// Per-lobby controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyConfig {
    #[serde(default = "default_render_debounce")]
    pub render_debounce_ms: u64,

    #[serde(default = "default_range_namespace")]
    pub range_namespace: String,
}

fn default_render_debounce() -> u64 {
    275
}

fn default_range_namespace() -> String {
    DEFAULT_RANGE_NAMESPACE.to_string()
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            render_debounce_ms: default_render_debounce(),
            range_namespace: default_range_namespace(),
        }
    }
}

impl LobbyConfig {
    pub fn render_debounce(&self) -> Duration {
        Duration::from_millis(self.render_debounce_ms)
    }
}

/// Option storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_options_path")]
    pub options_path: PathBuf,
}

fn default_options_path() -> PathBuf {
    PathBuf::from("./data/options.jsonl")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            options_path: default_options_path(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub lobby: LobbyConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            client: ClientConfig::default(),
            lobby: LobbyConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("web_base_url", &self.client.web_base_url),
            ("open_base_url", &self.client.open_base_url),
        ] {
            if let Err(e) = Url::parse(value) {
                return Err(ConfigError::ValidationError(format!(
                    "client.{} '{}' is not a valid URL: {}",
                    name, value, e
                )));
            }
        }

        if self.client.cache_ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "Cache TTL must be greater than 0".to_string(),
            ));
        }

        if self.client.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "Max attempts must be greater than 0".to_string(),
            ));
        }

        if self.client.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.client.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "Backoff multiplier must be at least 1".to_string(),
            ));
        }

        if self.lobby.range_namespace.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Range option namespace must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.client.cache_ttl_seconds, 3600);
        assert_eq!(config.client.negative_ttl_seconds, 30);
        assert_eq!(config.client.max_attempts, 3);
        assert_eq!(config.lobby.render_debounce(), Duration::from_millis(275));
        assert_eq!(config.lobby.range_namespace, "matchroom.range");
    }

    #[test]
    fn test_load_without_file_logs_at_info() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.log_level, "info");

        let empty: AppConfig = toml::from_str("").unwrap();
        assert_eq!(empty.log_level, config.log_level);
    }

    #[test]
    fn test_config_validation_ok() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_zero_ttl_and_attempts() {
        let mut config = AppConfig::default();
        config.client.cache_ttl_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.client.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_url() {
        let mut config = AppConfig::default();
        config.client.open_base_url = "not a url".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("open_base_url"));
    }

    #[test]
    fn test_zero_negative_ttl_is_allowed() {
        let mut config = AppConfig::default();
        config.client.negative_ttl_seconds = 0;

        assert!(config.validate().is_ok());
        assert_eq!(config.client.to_fetcher_config().negative_ttl, Duration::ZERO);
    }

    #[test]
    fn test_fetcher_config_conversion() {
        let mut client = ClientConfig::default();
        client.open_api_key = Some("key".to_string());
        client.retry_delay_ms = 250;

        let fetcher = client.to_fetcher_config();
        assert_eq!(fetcher.open_api_key.as_deref(), Some("key"));
        assert_eq!(fetcher.cache_ttl, Duration::from_secs(3600));
        assert_eq!(fetcher.retry.initial_delay, Duration::from_millis(250));
        assert_eq!(fetcher.retry.max_attempts, 3);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"debug\"\n\n[lobby]\nrender_debounce_ms = 100").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.lobby.render_debounce_ms, 100);
        assert_eq!(config.client.game, "cs2");
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();

        // Should be parseable
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.storage.options_path, parsed.storage.options_path);
    }
}
