//! Chat completion processor.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::error::ProcessError;
use crate::domain::models::{ApiGroup, CompletionJob, CompletionResult, LeasedMessage};
use crate::domain::ports::{CompletionApi, JobProcessor};
use crate::infrastructure::counter::CounterClient;
use crate::services::estimator::CostEstimator;

/// Reserve-invoke-report pipeline for one chat completion message.
pub struct CompletionProcessor {
    counter: Arc<CounterClient>,
    provider: Arc<dyn CompletionApi>,
    estimator: Arc<CostEstimator>,
    /// Output-token cap applied when a job does not carry its own.
    default_max_tokens: u32,
}

impl CompletionProcessor {
    pub fn new(
        counter: Arc<CounterClient>,
        provider: Arc<dyn CompletionApi>,
        estimator: Arc<CostEstimator>,
        default_max_tokens: u32,
    ) -> Self {
        Self {
            counter,
            provider,
            estimator,
            default_max_tokens,
        }
    }
}

#[async_trait]
impl JobProcessor for CompletionProcessor {
    fn group(&self) -> ApiGroup {
        ApiGroup::Completion
    }

    async fn process(&self, message: &LeasedMessage) -> Result<String, ProcessError> {
        let job: CompletionJob = serde_json::from_str(&message.body)
            .map_err(|e| ProcessError::Validation(format!("malformed completion job: {e}")))?;

        let amount = self.estimator.completion_cost(&job.prompt);
        let grant = self
            .counter
            .lock(i64::try_from(amount).unwrap_or(i64::MAX))
            .await
            .map_err(|e| ProcessError::Counter(e.to_string()))?;
        if !grant.allowed {
            return Err(ProcessError::QuotaDenied {
                group: ApiGroup::Completion,
                reason: grant
                    .error
                    .unwrap_or_else(|| "token limit would be exceeded".to_string()),
                seconds_until_reset: grant.seconds_until_reset,
            });
        }
        let handle = grant.request_id.unwrap_or_default();

        let max_tokens = job.max_tokens.unwrap_or(self.default_max_tokens);
        match self.provider.complete(&job.prompt, max_tokens).await {
            Ok(outcome) => {
                // Actual usage is authoritative; a failed report only leaks
                // the reservation until the next window roll.
                if let Err(err) = self
                    .counter
                    .report(
                        &handle,
                        i64::try_from(outcome.prompt_tokens).unwrap_or(i64::MAX),
                        i64::try_from(outcome.completion_tokens).unwrap_or(i64::MAX),
                    )
                    .await
                {
                    warn!(task_id = %job.task_id, error = %err, "usage report failed");
                }
                let result = CompletionResult {
                    task_id: job.task_id,
                    text: outcome.text,
                    prompt_tokens: outcome.prompt_tokens,
                    completion_tokens: outcome.completion_tokens,
                };
                serde_json::to_string(&result)
                    .map_err(|e| ProcessError::Validation(format!("failed to encode result: {e}")))
            }
            Err(err) => {
                if let Err(release_err) = self.counter.release(&handle).await {
                    warn!(task_id = %job.task_id, error = %release_err, "release failed");
                }
                Err(err)
            }
        }
    }
}
