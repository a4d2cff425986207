//! Worker pipeline skeleton.
//!
//! One cooperative loop per worker process: lease a batch from the input
//! queue, process each message concurrently up to a small fan-out under the
//! quota-wait coordinator, emit results to the output queue, and settle or
//! abandon each lease. The poll interval adapts to queue depth: it resets
//! to the floor whenever a batch produced work and doubles toward the cap
//! while the queue stays empty.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::domain::models::LeasedMessage;
use crate::domain::ports::{JobProcessor, MessageQueue};
use crate::services::quota_wait::QuotaWait;

/// Worker loop settings.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub batch_size: usize,
    pub fan_out: usize,
    pub poll_interval_min: Duration,
    pub poll_interval_max: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            fan_out: 5,
            poll_interval_min: Duration::from_millis(500),
            poll_interval_max: Duration::from_secs(30),
        }
    }
}

/// Next poll delay given whether the last batch was empty.
fn next_poll(current: Duration, config: &WorkerConfig, batch_was_empty: bool) -> Duration {
    if batch_was_empty {
        (current * 2).min(config.poll_interval_max)
    } else {
        config.poll_interval_min
    }
}

/// A single worker process's message loop.
pub struct Worker {
    input: Arc<dyn MessageQueue>,
    output: Arc<dyn MessageQueue>,
    processor: Arc<dyn JobProcessor>,
    coordinator: Arc<QuotaWait>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        input: Arc<dyn MessageQueue>,
        output: Arc<dyn MessageQueue>,
        processor: Arc<dyn JobProcessor>,
        coordinator: Arc<QuotaWait>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            input,
            output,
            processor,
            coordinator,
            config,
        }
    }

    /// Run until `shutdown` flips to true. The current batch is drained
    /// before returning; leases the broker holds for unprocessed messages
    /// simply expire and redeliver.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let group = self.processor.group();
        info!(%group, "worker loop started");
        let mut poll = self.config.poll_interval_min;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let batch = match self.input.receive(self.config.batch_size).await {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(%group, error = %err, "queue receive failed");
                    Vec::new()
                }
            };

            let batch_was_empty = batch.is_empty();
            if !batch_was_empty {
                debug!(%group, count = batch.len(), "leased batch");
                stream::iter(batch)
                    .for_each_concurrent(self.config.fan_out, |message| async move {
                        self.handle_message(message).await;
                    })
                    .await;
            }
            poll = next_poll(poll, &self.config, batch_was_empty);

            tokio::select! {
                () = sleep(poll) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!(%group, "worker loop stopped");
    }

    async fn handle_message(&self, message: LeasedMessage) {
        // Quota sleeps can outlast the initial visibility lock.
        if let Err(err) = self.input.renew_lock(&message).await {
            warn!(message_id = %message.id, error = %err, "lock renewal failed");
        }

        let group = self.processor.group();
        let result = self
            .coordinator
            .run(group, || self.processor.process(&message))
            .await;

        match result {
            Ok(output_body) => {
                if let Err(err) = self.output.send(output_body).await {
                    // The result is lost; abandon so the broker redelivers
                    // and the message is processed again.
                    error!(message_id = %message.id, error = %err, "output send failed");
                    self.abandon(&message).await;
                    return;
                }
                if let Err(err) = self.input.settle(&message).await {
                    warn!(message_id = %message.id, error = %err, "settle failed");
                }
            }
            Err(err) => {
                warn!(
                    message_id = %message.id,
                    delivery_count = message.delivery_count,
                    error = %err,
                    "processing failed; abandoning for redelivery"
                );
                self.abandon(&message).await;
            }
        }
    }

    async fn abandon(&self, message: &LeasedMessage) {
        if let Err(err) = self.input.abandon(message).await {
            warn!(message_id = %message.id, error = %err, "abandon failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::domain::error::ProcessError;
    use crate::domain::models::ApiGroup;
    use crate::infrastructure::queue::InMemoryQueue;
    use crate::services::quota_wait::{QuotaWaitConfig, ResetQuery};

    struct InstantReset;

    #[async_trait]
    impl ResetQuery for InstantReset {
        async fn seconds_until_reset(&self, _group: ApiGroup) -> Option<u64> {
            Some(0)
        }
    }

    fn coordinator() -> Arc<QuotaWait> {
        Arc::new(QuotaWait::new(
            Arc::new(InstantReset),
            QuotaWaitConfig {
                max_attempts: 3,
                buffer_secs: 0,
                fallback_secs: 0,
            },
        ))
    }

    fn config() -> WorkerConfig {
        WorkerConfig {
            batch_size: 10,
            fan_out: 4,
            poll_interval_min: Duration::from_millis(10),
            poll_interval_max: Duration::from_millis(80),
        }
    }

    /// Processor that fails the first `deny` calls with a quota denial and
    /// the next `fail` calls with a provider error, then succeeds.
    struct ScriptedProcessor {
        deny: u32,
        fail: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl JobProcessor for ScriptedProcessor {
        fn group(&self) -> ApiGroup {
            ApiGroup::Completion
        }

        async fn process(&self, message: &LeasedMessage) -> Result<String, ProcessError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.deny {
                Err(ProcessError::QuotaDenied {
                    group: ApiGroup::Completion,
                    reason: "token limit would be exceeded".to_string(),
                    seconds_until_reset: Some(0),
                })
            } else if call < self.deny + self.fail {
                Err(ProcessError::Provider("upstream 500".to_string()))
            } else {
                Ok(format!("done:{}", message.body))
            }
        }
    }

    async fn run_briefly(worker: &Worker, millis: u64) {
        let (tx, rx) = watch::channel(false);
        let run = worker.run(rx);
        tokio::pin!(run);
        tokio::select! {
            () = &mut run => {}
            () = sleep(Duration::from_millis(millis)) => {
                tx.send(true).unwrap();
                run.await;
            }
        }
    }

    #[tokio::test]
    async fn test_success_emits_output_and_settles() {
        let input = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
        let output = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
        input.send("job-1".to_string()).await.unwrap();
        input.send("job-2".to_string()).await.unwrap();

        let worker = Worker::new(
            input.clone(),
            output.clone(),
            Arc::new(ScriptedProcessor {
                deny: 0,
                fail: 0,
                calls: AtomicU32::new(0),
            }),
            coordinator(),
            config(),
        );
        run_briefly(&worker, 100).await;

        assert_eq!(output.depth().await, 2);
        assert_eq!(input.depth().await, 0);
        assert_eq!(input.leased_count().await, 0);
    }

    #[tokio::test]
    async fn test_provider_error_abandons_for_redelivery() {
        let input = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
        let output = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
        input.send("job-1".to_string()).await.unwrap();

        let worker = Worker::new(
            input.clone(),
            output.clone(),
            Arc::new(ScriptedProcessor {
                deny: 0,
                fail: 1,
                calls: AtomicU32::new(0),
            }),
            coordinator(),
            config(),
        );
        run_briefly(&worker, 120).await;

        // First delivery failed and was abandoned; a later poll succeeded.
        assert_eq!(output.depth().await, 1);
        assert_eq!(input.depth().await, 0);
    }

    #[tokio::test]
    async fn test_quota_denial_is_absorbed_by_coordinator() {
        let input = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
        let output = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
        input.send("job-1".to_string()).await.unwrap();

        let worker = Worker::new(
            input.clone(),
            output.clone(),
            Arc::new(ScriptedProcessor {
                deny: 2,
                fail: 0,
                calls: AtomicU32::new(0),
            }),
            coordinator(),
            config(),
        );
        run_briefly(&worker, 120).await;

        // The denials never reached the broker: one delivery, one output.
        assert_eq!(output.depth().await, 1);
        assert_eq!(input.depth().await, 0);
    }

    #[test]
    fn test_poll_interval_adapts() {
        let config = config();
        let min = config.poll_interval_min;
        let max = config.poll_interval_max;

        // Empty batches double the interval up to the cap.
        let mut poll = min;
        poll = next_poll(poll, &config, true);
        assert_eq!(poll, min * 2);
        poll = next_poll(poll, &config, true);
        poll = next_poll(poll, &config, true);
        poll = next_poll(poll, &config, true);
        assert_eq!(poll, max);

        // A productive batch snaps back to the floor.
        poll = next_poll(poll, &config, false);
        assert_eq!(poll, min);
    }
}
