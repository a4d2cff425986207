//! Queue message and job payload types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message leased from the input queue.
///
/// The broker holds a per-message visibility lock from receive until the
/// worker settles or abandons it; the lock may be renewed while long-running
/// work is in flight.
#[derive(Debug, Clone)]
pub struct LeasedMessage {
    /// Broker-assigned message identity, stable across redeliveries.
    pub id: Uuid,
    /// Opaque message body; job payloads are JSON-encoded into it.
    pub body: String,
    /// How many times this message has been delivered, including this lease.
    pub delivery_count: u32,
}

/// Chat completion work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionJob {
    /// Caller-assigned identifier propagated into the result.
    pub task_id: String,
    pub prompt: String,
    /// Per-job cap on generated tokens; the worker default applies when absent.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Result emitted for a completed chat job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResult {
    pub task_id: String,
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Embedding work item: one or more texts embedded in a single call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingJob {
    pub task_id: String,
    pub texts: Vec<String>,
}

/// Result emitted for a completed embedding job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResult {
    pub task_id: String,
    pub vectors: Vec<Vec<f32>>,
    pub prompt_tokens: u64,
}

/// Audio transcription work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionJob {
    pub task_id: String,
    /// Location of the audio blob; fetched by the provider adapter.
    pub audio_url: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// Result emitted for a completed transcription job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub task_id: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_job_max_tokens_defaults_to_none() {
        let job: CompletionJob =
            serde_json::from_str(r#"{"task_id":"t1","prompt":"hello"}"#).unwrap();
        assert_eq!(job.task_id, "t1");
        assert!(job.max_tokens.is_none());
    }

    #[test]
    fn test_transcription_job_parses_language() {
        let job: TranscriptionJob = serde_json::from_str(
            r#"{"task_id":"t2","audio_url":"https://blobs/x.wav","language":"en"}"#,
        )
        .unwrap();
        assert_eq!(job.language.as_deref(), Some("en"));
    }
}
