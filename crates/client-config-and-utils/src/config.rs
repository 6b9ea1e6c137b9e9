//! Configuration management for the client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default auth backend URL (can be overridden at compile time via AUTHFLOW_BACKEND_URL env var).
pub const DEFAULT_BACKEND_URL: &str = match option_env!("AUTHFLOW_BACKEND_URL") {
    Some(url) => url,
    None => "http://localhost:4000/v1/auth",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Seconds before expiry at which an access token is already treated as stale.
pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 60;

/// Minimum password length enforced before any request is sent.
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_AUTO_REFRESH_INTERVAL_SECS: u64 = 30;

/// Retry settings for token refresh on transient failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    /// Maximum number of refresh attempts.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Base URL of the auth backend.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// Safety margin applied to access-token expiry.
    #[serde(default = "default_clock_skew_secs")]
    pub clock_skew_secs: u64,
    /// Per-request timeout for backend calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// How often the background refresher checks the token.
    #[serde(default = "default_auto_refresh_interval_secs")]
    pub auto_refresh_interval_secs: u64,
    /// Minimum accepted password length.
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
    /// Refresh retry policy.
    #[serde(default)]
    pub refresh: RefreshSettings,
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_clock_skew_secs() -> u64 {
    DEFAULT_CLOCK_SKEW_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_auto_refresh_interval_secs() -> u64 {
    DEFAULT_AUTO_REFRESH_INTERVAL_SECS
}

fn default_min_password_length() -> usize {
    DEFAULT_MIN_PASSWORD_LENGTH
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            auto_refresh_interval_secs: DEFAULT_AUTO_REFRESH_INTERVAL_SECS,
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
            refresh: RefreshSettings::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    ///
    /// Environment variables take precedence over the file.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("AUTHFLOW_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(backend_url) = std::env::var("AUTHFLOW_BACKEND_URL") {
            if !backend_url.trim().is_empty() {
                self.backend_url = backend_url.trim().to_string();
            }
        }
    }

    /// Reject values that would make the session layer misbehave.
    pub fn validate(&self) -> CoreResult<()> {
        self.backend_url()?;
        if self.refresh.max_retries == 0 {
            return Err(CoreError::Config(
                "refresh.max_retries must be at least 1".to_string(),
            ));
        }
        if self.auto_refresh_interval_secs == 0 {
            return Err(CoreError::Config(
                "auto_refresh_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the backend URL as a parsed URL.
    pub fn backend_url(&self) -> CoreResult<Url> {
        Url::parse(&self.backend_url).map_err(CoreError::from)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn auto_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.auto_refresh_interval_secs)
    }
}
