//! Configuration management for the verification engine.
//!
//! Configuration can be set via environment variables:
//! - `GITHUB_TOKEN` - Required. Token used for all provider API calls.
//! - `GITHUB_API_URL` - Optional. Provider API base URL. Defaults to `https://api.github.com`.
//! - `WEBHOOK_SECRET` - Optional. Shared secret for inbound webhook signatures.
//!   Webhook deliveries are rejected when unset.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `DATA_DIR` - Optional. Project store directory. Defaults to `./data`.
//! - `MAX_DOING_TASKS` - Optional. Per-user concurrent `doing` limit. Defaults to `2`.
//! - `POLL_DELAY_SECS` - Optional. Delay before the single post-dispatch poll. Defaults to `8`.
//! - `MEMBERSHIP_TTL_SECS` - Optional. Membership cache TTL. Defaults to `300`.
//! - `PROVIDER_TIMEOUT_SECS` - Optional. Per-call provider timeout. Defaults to `10`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Provider API token
    pub github_token: String,

    /// Provider API base URL
    pub github_api_url: String,

    /// Shared secret for webhook signature verification
    pub webhook_secret: Option<String>,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Directory for the project store
    pub data_dir: PathBuf,

    /// Maximum concurrent `doing` tasks per assignee
    pub max_doing_tasks: usize,

    /// Seconds to wait before the single post-dispatch poll
    pub poll_delay_secs: u64,

    /// Seconds a cached membership lookup stays fresh
    pub membership_ttl_secs: u64,

    /// Per-call provider timeout in seconds
    pub provider_timeout_secs: u64,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `GITHUB_TOKEN` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let github_token = std::env::var("GITHUB_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("GITHUB_TOKEN".to_string()))?;

        let github_api_url = std::env::var("GITHUB_API_URL")
            .unwrap_or_else(|_| "https://api.github.com".to_string());

        let webhook_secret = std::env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty());

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        Ok(Self {
            github_token,
            github_api_url,
            webhook_secret,
            host,
            port: env_parse("PORT", 3000)?,
            data_dir,
            max_doing_tasks: env_parse("MAX_DOING_TASKS", 2)?,
            poll_delay_secs: env_parse("POLL_DELAY_SECS", 8)?,
            membership_ttl_secs: env_parse("MEMBERSHIP_TTL_SECS", 300)?,
            provider_timeout_secs: env_parse("PROVIDER_TIMEOUT_SECS", 10)?,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(github_token: String, data_dir: PathBuf) -> Self {
        Self {
            github_token,
            github_api_url: "https://api.github.com".to_string(),
            webhook_secret: None,
            host: "127.0.0.1".to_string(),
            port: 3000,
            data_dir,
            max_doing_tasks: 2,
            poll_delay_secs: 8,
            membership_ttl_secs: 300,
            provider_timeout_secs: 10,
        }
    }
}
