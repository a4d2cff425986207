//! Provider API ports.
//!
//! The LLM and speech-to-text providers are opaque HTTP endpoints; these
//! traits are the seams the processors call through, so tests can substitute
//! mock servers or stub implementations.

use async_trait::async_trait;

use crate::domain::error::ProcessError;

/// Outcome of a chat completion call, with the provider's authoritative
/// usage accounting.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Outcome of an embedding call.
#[derive(Debug, Clone)]
pub struct EmbeddingOutcome {
    /// One vector per input text, in input order.
    pub vectors: Vec<Vec<f32>>,
    pub prompt_tokens: u64,
}

/// Chat completion endpoint.
#[async_trait]
pub trait CompletionApi: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<ChatOutcome, ProcessError>;
}

/// Embedding endpoint.
#[async_trait]
pub trait EmbeddingApi: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingOutcome, ProcessError>;
}

/// Speech-to-text endpoint.
#[async_trait]
pub trait TranscriptionApi: Send + Sync {
    async fn transcribe(
        &self,
        audio_url: &str,
        language: Option<&str>,
    ) -> Result<String, ProcessError>;
}
