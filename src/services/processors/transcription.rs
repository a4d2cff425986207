//! Audio transcription processor.
//!
//! Transcription is metered by request count alone: every file consumes one
//! slot of the requests-only pool regardless of duration.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::error::ProcessError;
use crate::domain::models::{ApiGroup, LeasedMessage, TranscriptionJob, TranscriptionResult};
use crate::domain::ports::{JobProcessor, TranscriptionApi};
use crate::infrastructure::counter::CounterClient;

pub struct TranscriptionProcessor {
    counter: Arc<CounterClient>,
    provider: Arc<dyn TranscriptionApi>,
}

impl TranscriptionProcessor {
    pub fn new(counter: Arc<CounterClient>, provider: Arc<dyn TranscriptionApi>) -> Self {
        Self { counter, provider }
    }
}

#[async_trait]
impl JobProcessor for TranscriptionProcessor {
    fn group(&self) -> ApiGroup {
        ApiGroup::Transcription
    }

    async fn process(&self, message: &LeasedMessage) -> Result<String, ProcessError> {
        let job: TranscriptionJob = serde_json::from_str(&message.body)
            .map_err(|e| ProcessError::Validation(format!("malformed transcription job: {e}")))?;

        let grant = self
            .counter
            .lock_transcription()
            .await
            .map_err(|e| ProcessError::Counter(e.to_string()))?;
        if !grant.allowed {
            return Err(ProcessError::QuotaDenied {
                group: ApiGroup::Transcription,
                reason: grant
                    .error
                    .unwrap_or_else(|| "rate limit would be exceeded".to_string()),
                seconds_until_reset: grant.seconds_until_reset,
            });
        }
        let handle = grant.request_id.unwrap_or_default();

        match self
            .provider
            .transcribe(&job.audio_url, job.language.as_deref())
            .await
        {
            Ok(text) => {
                if let Err(err) = self.counter.report_transcription(&handle).await {
                    warn!(task_id = %job.task_id, error = %err, "usage report failed");
                }
                let result = TranscriptionResult {
                    task_id: job.task_id,
                    text,
                };
                serde_json::to_string(&result)
                    .map_err(|e| ProcessError::Validation(format!("failed to encode result: {e}")))
            }
            Err(err) => {
                if let Err(release_err) = self.counter.release_transcription(&handle).await {
                    warn!(task_id = %job.task_id, error = %release_err, "release failed");
                }
                Err(err)
            }
        }
    }
}
