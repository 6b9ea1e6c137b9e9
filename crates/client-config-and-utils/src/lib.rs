//! Core configuration, paths, and logging for the authflow client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, RefreshSettings, DEFAULT_BACKEND_URL, DEFAULT_CLOCK_SKEW_SECS, DEFAULT_LOG_LEVEL,
    DEFAULT_MIN_PASSWORD_LENGTH,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level, LogFormat};
pub use paths::Paths;
