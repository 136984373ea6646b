use hireai_core::avatar::{AvatarConfig, HEYGEN_API_URL};
use hireai_core::identity::CLERK_API_URL;
use hireai_core::interviewer::DEFAULT_CHAT_MODEL;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: SecretString,
    pub chat_model: String,
    pub clerk_secret_key: SecretString,
    pub clerk_api_url: String,
    /// `None` when the HeyGen variables are not set; avatar routes then answer 503.
    pub avatar: Option<AvatarConfig>,
    pub prompts_dir: Option<PathBuf>,
    pub log_level: Level,
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// This function will look for a `.env` file in the current directory
    /// and load the following variables:
    ///
    /// *   `BIND_ADDRESS`: The address and port to bind the server to. Defaults to "0.0.0.0:3000".
    /// *   `OPENAI_API_KEY`: Secret key for the OpenAI chat API.
    /// *   `CHAT_MODEL`: (Optional) The model that plays the interviewer. Defaults to "gpt-4o".
    /// *   `CLERK_SECRET_KEY`: Secret key for the Clerk backend API.
    /// *   `CLERK_API_URL`: (Optional) Overrides the Clerk API base URL.
    /// *   `HEYGEN_API_KEY`, `HEYGEN_AVATAR_ID`, `HEYGEN_VOICE_ID`: (Optional) Enable avatar videos.
    ///     `HEYGEN_API_URL` overrides the HeyGen base URL.
    /// *   `PROMPTS_DIR`: (Optional) Directory of `*.md` prompt overrides.
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = SecretString::from(required("OPENAI_API_KEY")?);
        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string());

        let clerk_secret_key = SecretString::from(required("CLERK_SECRET_KEY")?);
        let clerk_api_url =
            std::env::var("CLERK_API_URL").unwrap_or_else(|_| CLERK_API_URL.to_string());

        let avatar = match std::env::var("HEYGEN_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Some(AvatarConfig {
                api_key: SecretString::from(key),
                avatar_id: required("HEYGEN_AVATAR_ID")?,
                voice_id: required("HEYGEN_VOICE_ID")?,
                base_url: std::env::var("HEYGEN_API_URL")
                    .unwrap_or_else(|_| HEYGEN_API_URL.to_string()),
            }),
            _ => None,
        };

        let prompts_dir = std::env::var("PROMPTS_DIR").ok().map(PathBuf::from);

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            chat_model,
            clerk_secret_key,
            clerk_api_url,
            avatar,
            prompts_dir,
            log_level,
        })
    }
}
