//! Provider API client infrastructure.
//!
//! HTTP client for the LLM / speech-to-text provider with:
//! - Request/response handling for chat, embeddings, and transcription
//! - Error classification (transient vs permanent)
//! - Retry logic with exponential backoff for transient errors

pub mod error;
pub mod openai;
pub mod retry;

pub use error::ProviderApiError;
pub use openai::OpenAiClient;
pub use retry::RetryPolicy;
