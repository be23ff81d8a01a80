use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_LLM_MODEL: &str = "claude-sonnet-4-5";

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub anthropic_api_url: String,
    pub llm_model: String,
    pub llm_max_tokens: u32,
    /// Bounds the model call plus the whole relay/persist continuation of a job.
    pub job_max_duration: Duration,
    /// Store polling fallback for job status when no in-process signal exists.
    pub status_poll_attempts: u32,
    pub status_poll_interval: Duration,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            anthropic_api_url: std::env::var("ANTHROPIC_API_URL")
                .unwrap_or_else(|_| DEFAULT_ANTHROPIC_API_URL.to_string()),
            llm_model: std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string()),
            llm_max_tokens: parse_env("LLM_MAX_TOKENS", 8192)?,
            job_max_duration: Duration::from_secs(parse_env("JOB_MAX_DURATION_SECS", 60)?),
            status_poll_attempts: parse_env("STATUS_POLL_ATTEMPTS", 5)?,
            status_poll_interval: Duration::from_millis(parse_env(
                "STATUS_POLL_INTERVAL_MS",
                1000,
            )?),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 20 * 1024 * 1024)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Total time a status request may spend waiting on a job.
    pub fn status_wait_budget(&self) -> Duration {
        self.status_poll_interval * self.status_poll_attempts
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/coursegen_test".to_string(),
            anthropic_api_key: "test-key".to_string(),
            anthropic_api_url: DEFAULT_ANTHROPIC_API_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_max_tokens: 1024,
            job_max_duration: Duration::from_secs(60),
            status_poll_attempts: 3,
            status_poll_interval: Duration::from_millis(10),
            max_upload_bytes: 1024 * 1024,
            port: 0,
            rust_log: "debug".to_string(),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_default_and_override() {
        assert_eq!(parse_env::<u32>("COURSEGEN_TEST_UNSET_KEY", 7).unwrap(), 7);

        std::env::set_var("COURSEGEN_TEST_PORT", " 9090 ");
        assert_eq!(parse_env::<u16>("COURSEGEN_TEST_PORT", 8080).unwrap(), 9090);

        std::env::set_var("COURSEGEN_TEST_BAD", "sixty");
        let err = parse_env::<u64>("COURSEGEN_TEST_BAD", 60).unwrap_err();
        assert!(err.to_string().contains("COURSEGEN_TEST_BAD"));
    }

    #[test]
    fn test_status_wait_budget() {
        let config = Config::for_tests();
        assert_eq!(config.status_wait_budget(), Duration::from_millis(30));
    }
}
