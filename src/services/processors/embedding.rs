//! Embedding processor.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::error::ProcessError;
use crate::domain::models::{ApiGroup, EmbeddingJob, EmbeddingResult, LeasedMessage};
use crate::domain::ports::{EmbeddingApi, JobProcessor};
use crate::infrastructure::counter::CounterClient;
use crate::services::estimator::CostEstimator;

/// Reserve-invoke-report pipeline for one embedding batch message.
pub struct EmbeddingProcessor {
    counter: Arc<CounterClient>,
    provider: Arc<dyn EmbeddingApi>,
    estimator: Arc<CostEstimator>,
}

impl EmbeddingProcessor {
    pub fn new(
        counter: Arc<CounterClient>,
        provider: Arc<dyn EmbeddingApi>,
        estimator: Arc<CostEstimator>,
    ) -> Self {
        Self {
            counter,
            provider,
            estimator,
        }
    }
}

#[async_trait]
impl JobProcessor for EmbeddingProcessor {
    fn group(&self) -> ApiGroup {
        ApiGroup::Embedding
    }

    async fn process(&self, message: &LeasedMessage) -> Result<String, ProcessError> {
        let job: EmbeddingJob = serde_json::from_str(&message.body)
            .map_err(|e| ProcessError::Validation(format!("malformed embedding job: {e}")))?;
        if job.texts.is_empty() {
            return Err(ProcessError::Validation(
                "embedding job has no texts".to_string(),
            ));
        }

        let amount = self.estimator.embedding_cost(&job.texts);
        let grant = self
            .counter
            .lock_embedding(i64::try_from(amount).unwrap_or(i64::MAX))
            .await
            .map_err(|e| ProcessError::Counter(e.to_string()))?;
        if !grant.allowed {
            return Err(ProcessError::QuotaDenied {
                group: ApiGroup::Embedding,
                reason: grant
                    .error
                    .unwrap_or_else(|| "token limit would be exceeded".to_string()),
                seconds_until_reset: grant.seconds_until_reset,
            });
        }
        let handle = grant.request_id.unwrap_or_default();

        match self.provider.embed(&job.texts).await {
            Ok(outcome) => {
                if let Err(err) = self
                    .counter
                    .report_embedding(
                        &handle,
                        i64::try_from(outcome.prompt_tokens).unwrap_or(i64::MAX),
                    )
                    .await
                {
                    warn!(task_id = %job.task_id, error = %err, "usage report failed");
                }
                let result = EmbeddingResult {
                    task_id: job.task_id,
                    vectors: outcome.vectors,
                    prompt_tokens: outcome.prompt_tokens,
                };
                serde_json::to_string(&result)
                    .map_err(|e| ProcessError::Validation(format!("failed to encode result: {e}")))
            }
            Err(err) => {
                if let Err(release_err) = self.counter.release_embedding(&handle).await {
                    warn!(task_id = %job.task_id, error = %release_err, "release failed");
                }
                Err(err)
            }
        }
    }
}
