//! Quota-wait coordinator.
//!
//! Wraps a provider call with the rule that makes the fleet usable: when the
//! call fails because our own counter refused the reservation, do not retry
//! immediately; sleep until the window rolls, then retry. Any other failure
//! propagates untouched. There is no exponential component; the sleep
//! targets the exact end of the current window plus a small skew buffer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::domain::error::ProcessError;
use crate::domain::models::ApiGroup;

/// Source of a group's time-to-reset, queried before every quota sleep.
///
/// Implemented by the reservation client against the counter's status
/// endpoints; tests substitute fixed horizons.
#[async_trait]
pub trait ResetQuery: Send + Sync {
    /// Whole seconds until the group's window rolls, or `None` when the
    /// counter could not answer.
    async fn seconds_until_reset(&self, group: ApiGroup) -> Option<u64>;
}

/// Coordinator settings.
#[derive(Debug, Clone, Copy)]
pub struct QuotaWaitConfig {
    /// Attempt cap, counting the initial call.
    pub max_attempts: u32,
    /// Extra seconds slept beyond the reported reset to absorb clock skew.
    pub buffer_secs: u64,
    /// Sleep used when the counter cannot report a reset horizon; one full
    /// window guarantees a roll.
    pub fallback_secs: u64,
}

impl Default for QuotaWaitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            buffer_secs: 2,
            fallback_secs: 60,
        }
    }
}

/// Translates quota denials into sleeps aligned with window roll-over.
pub struct QuotaWait {
    reset_query: Arc<dyn ResetQuery>,
    config: QuotaWaitConfig,
}

impl QuotaWait {
    pub fn new(reset_query: Arc<dyn ResetQuery>, config: QuotaWaitConfig) -> Self {
        Self {
            reset_query,
            config,
        }
    }

    /// Execute `operation`, absorbing quota denials with targeted sleeps.
    ///
    /// The reset horizon is re-queried on every retry rather than reused:
    /// the window may have rolled during a preceding retry's own work.
    /// Dropping the returned future aborts any in-progress sleep.
    pub async fn run<F, Fut, T>(&self, group: ApiGroup, mut operation: F) -> Result<T, ProcessError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProcessError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_quota_denial() => {
                    if attempt >= self.config.max_attempts {
                        info!(
                            %group,
                            attempts = attempt,
                            "quota-wait attempts exhausted"
                        );
                        return Err(err);
                    }
                    let wait = self.reset_wait(group).await;
                    debug!(
                        %group,
                        attempt,
                        wait_secs = wait.as_secs(),
                        "quota denied; sleeping until window rolls"
                    );
                    sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn reset_wait(&self, group: ApiGroup) -> Duration {
        let reset_secs = self
            .reset_query
            .seconds_until_reset(group)
            .await
            .unwrap_or(self.config.fallback_secs);
        Duration::from_secs(reset_secs.saturating_add(self.config.buffer_secs))
    }
}
