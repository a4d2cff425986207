use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid limit for {0}: must be a positive integer")]
    InvalidLimit(&'static str),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Counter base URL cannot be empty")]
    EmptyCounterUrl,

    #[error("Invalid timeout: {0}. Must be at least 1 second")]
    InvalidTimeout(u64),

    #[error("Invalid batch_size: {0}. Must be at least 1")]
    InvalidBatchSize(usize),

    #[error("Invalid fan_out: {0}. Must be at least 1")]
    InvalidFanOut(usize),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error(
        "Invalid poll interval: min ({0}ms) must not exceed max ({1}ms)"
    )]
    InvalidPollInterval(u64, u64),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. ./floodgate.yaml (optional)
    /// 3. Environment variables (`FLOODGATE_`* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("floodgate.yaml"))
            .merge(Env::prefixed("FLOODGATE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        // Every budget limit must be a positive integer.
        if config.counter.completion.tokens_per_minute == 0 {
            return Err(ConfigError::InvalidLimit("completion.tokens_per_minute"));
        }
        if config.counter.completion.requests_per_minute == 0 {
            return Err(ConfigError::InvalidLimit("completion.requests_per_minute"));
        }
        if config.counter.embedding.tokens_per_minute == 0 {
            return Err(ConfigError::InvalidLimit("embedding.tokens_per_minute"));
        }
        if config.counter.embedding.requests_per_minute == 0 {
            return Err(ConfigError::InvalidLimit("embedding.requests_per_minute"));
        }
        if config.counter.transcription.requests_per_minute == 0 {
            return Err(ConfigError::InvalidLimit(
                "transcription.requests_per_minute",
            ));
        }

        if config.client.base_url.is_empty() {
            return Err(ConfigError::EmptyCounterUrl);
        }
        if config.client.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(config.client.timeout_secs));
        }
        if config.provider.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(config.provider.timeout_secs));
        }

        if config.provider.initial_backoff_ms >= config.provider.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.provider.initial_backoff_ms,
                config.provider.max_backoff_ms,
            ));
        }

        if config.worker.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(config.worker.batch_size));
        }
        if config.worker.fan_out == 0 {
            return Err(ConfigError::InvalidFanOut(config.worker.fan_out));
        }
        if config.worker.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.worker.max_attempts));
        }
        if config.worker.poll_interval_min_ms > config.worker.poll_interval_max_ms {
            return Err(ConfigError::InvalidPollInterval(
                config.worker.poll_interval_min_ms,
                config.worker.poll_interval_max_ms,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        Ok(())
    }
}
