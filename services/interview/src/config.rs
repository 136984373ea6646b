//! Application Configuration Module
//!
//! Loads the console interview client's settings from the environment.

use hireai_core::silence::DEFAULT_SILENCE_MS;
use std::env;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_QUESTION_COUNT: usize = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub silence: Duration,
    pub question_count: usize,
    pub log_level: Level,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// *   `API_BASE_URL`: (Optional) Where `hireai-api` listens. Defaults to "http://localhost:3000".
    /// *   `SILENCE_MS`: (Optional) Quiet period that ends an answer. Defaults to 1500.
    /// *   `QUESTION_COUNT`: (Optional) Answers before the interview completes. Defaults to 5.
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "WARN" to keep the console readable.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_base_url =
            env::var("API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
        if api_base_url.trim().is_empty() {
            return Err(ConfigError::MissingVar("API_BASE_URL".to_string()));
        }

        let silence = Duration::from_millis(parse_var("SILENCE_MS", DEFAULT_SILENCE_MS)?);

        let question_count = parse_var("QUESTION_COUNT", DEFAULT_QUESTION_COUNT)?;
        if question_count == 0 {
            return Err(ConfigError::InvalidValue(
                "QUESTION_COUNT".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "WARN".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            api_base_url,
            silence,
            question_count,
            log_level,
        })
    }
}
