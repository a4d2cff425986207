//! Configuration model.
//!
//! Every field has a programmatic default so the fleet can boot with no
//! config file at all; overrides come from `floodgate.yaml` and
//! `FLOODGATE_`-prefixed environment variables (see
//! [`ConfigLoader`](crate::infrastructure::config::ConfigLoader)).

use serde::{Deserialize, Serialize};

/// Root configuration shared by the counter service and the workers.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub counter: CounterConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub logging: LogConfig,
}

/// Per-budget limits and listen address for the counter service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterConfig {
    /// TCP port the counter listens on.
    #[serde(default = "default_counter_port")]
    pub port: u16,
    /// Chat completion pair: tokens/min and requests/min.
    #[serde(default = "default_completion_limits")]
    pub completion: PairLimits,
    /// Embedding pair: tokens/min and requests/min.
    #[serde(default = "default_embedding_limits")]
    pub embedding: PairLimits,
    /// Audio transcription: requests/min only.
    #[serde(default = "default_transcription_limits")]
    pub transcription: RequestLimit,
}

/// Paired tokens-per-minute and requests-per-minute limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PairLimits {
    pub tokens_per_minute: u64,
    pub requests_per_minute: u64,
}

/// A requests-per-minute-only limit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RequestLimit {
    pub requests_per_minute: u64,
}

/// Reservation client settings, one per worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the counter service.
    #[serde(default = "default_counter_url")]
    pub base_url: String,
    /// Free-form identifier this worker reports on every reservation.
    #[serde(default = "default_app_id")]
    pub app_id: String,
    /// Deadline for each counter HTTP call.
    #[serde(default = "default_client_timeout_secs")]
    pub timeout_secs: u64,
}

/// Provider endpoint and resilience settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key. Falls back to `OPENAI_API_KEY` env var.
    pub api_key: Option<String>,
    /// Base URL for the provider API.
    #[serde(default = "default_provider_url")]
    pub base_url: String,
    /// Deployment identifier for chat completions.
    #[serde(default = "default_chat_deployment")]
    pub chat_deployment: String,
    /// Deployment identifier for embeddings.
    #[serde(default = "default_embedding_deployment")]
    pub embedding_deployment: String,
    /// Deployment identifier for audio transcription.
    #[serde(default = "default_transcription_deployment")]
    pub transcription_deployment: String,
    /// Request timeout in seconds.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    /// Transient-error retries inside the provider client.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

/// Worker pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    #[serde(default = "default_input_queue")]
    pub input_queue: String,
    #[serde(default = "default_output_queue")]
    pub output_queue: String,
    /// Messages requested per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Concurrent in-flight messages per worker process.
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,
    /// Poll interval floor, used whenever a batch produced work.
    #[serde(default = "default_poll_min_ms")]
    pub poll_interval_min_ms: u64,
    /// Poll interval ceiling, approached while the queue stays empty.
    #[serde(default = "default_poll_max_ms")]
    pub poll_interval_max_ms: u64,
    /// Quota-wait coordinator attempt cap per message.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Extra sleep beyond `seconds_until_reset` to absorb clock skew.
    #[serde(default = "default_backoff_buffer_secs")]
    pub backoff_buffer_secs: u64,
    /// Tokens reserved for the unknown completion length at lock time.
    #[serde(default = "default_completion_reserve")]
    pub completion_reserve_tokens: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            port: default_counter_port(),
            completion: default_completion_limits(),
            embedding: default_embedding_limits(),
            transcription: default_transcription_limits(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_counter_url(),
            app_id: default_app_id(),
            timeout_secs: default_client_timeout_secs(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_provider_url(),
            chat_deployment: default_chat_deployment(),
            embedding_deployment: default_embedding_deployment(),
            transcription_deployment: default_transcription_deployment(),
            timeout_secs: default_provider_timeout_secs(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            input_queue: default_input_queue(),
            output_queue: default_output_queue(),
            batch_size: default_batch_size(),
            fan_out: default_fan_out(),
            poll_interval_min_ms: default_poll_min_ms(),
            poll_interval_max_ms: default_poll_max_ms(),
            max_attempts: default_max_attempts(),
            backoff_buffer_secs: default_backoff_buffer_secs(),
            completion_reserve_tokens: default_completion_reserve(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_counter_port() -> u16 {
    8701
}

fn default_completion_limits() -> PairLimits {
    PairLimits {
        tokens_per_minute: 100_000,
        requests_per_minute: 600,
    }
}

fn default_embedding_limits() -> PairLimits {
    PairLimits {
        tokens_per_minute: 1_000_000,
        requests_per_minute: 3_000,
    }
}

fn default_transcription_limits() -> RequestLimit {
    RequestLimit {
        requests_per_minute: 15,
    }
}

fn default_counter_url() -> String {
    "http://127.0.0.1:8701".to_string()
}

fn default_app_id() -> String {
    "floodgate-worker".to_string()
}

fn default_client_timeout_secs() -> u64 {
    10
}

fn default_provider_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_deployment() -> String {
    "gpt-4o".to_string()
}

fn default_embedding_deployment() -> String {
    "text-embedding-3-small".to_string()
}

fn default_transcription_deployment() -> String {
    "whisper-1".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    10_000
}

fn default_max_backoff_ms() -> u64 {
    300_000
}

fn default_input_queue() -> String {
    "jobs-in".to_string()
}

fn default_output_queue() -> String {
    "jobs-out".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_fan_out() -> usize {
    5
}

fn default_poll_min_ms() -> u64 {
    500
}

fn default_poll_max_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_buffer_secs() -> u64 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_completion_reserve() -> u64 {
    1_024
}
