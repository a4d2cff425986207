//! Steady-state throughput shaping: many clients repeatedly locking and
//! reporting against one budget are admitted at exactly limit/amount per
//! window, with coordinator sleeps absorbing the rest.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{client_for, counter_config, spawn_counter};
use floodgate::domain::error::ProcessError;
use floodgate::domain::models::ApiGroup;
use floodgate::infrastructure::counter::CounterClient;
use floodgate::services::{QuotaWait, QuotaWaitConfig};

const WINDOW_SECS: i64 = 2;
const RUN_SECS: u64 = 5;

async fn lock_and_report(client: &CounterClient, amount: i64) -> Result<(), ProcessError> {
    let grant = client
        .lock(amount)
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
    client
        .report(&handle, amount, 0)
        .await
        .map_err(|e| ProcessError::Counter(e.to_string()))?;
    Ok(())
}

#[tokio::test]
async fn test_ten_workers_on_a_five_slot_budget_are_paced_per_window() {
    // 5000 tokens per (short) window, each worker consuming 1000 per call:
    // five admissions per window regardless of how many workers compete.
    let base_url = spawn_counter(&counter_config((5000, 100), (1000, 10), 15), WINDOW_SECS).await;

    let successes = Arc::new(AtomicU32::new(0));
    let deadline = Instant::now() + Duration::from_secs(RUN_SECS);

    let mut workers = Vec::new();
    for i in 0..10 {
        let base_url = base_url.clone();
        let successes = Arc::clone(&successes);
        workers.push(tokio::spawn(async move {
            let client = Arc::new(client_for(&base_url, &format!("worker-{i}")));
            let coordinator = QuotaWait::new(
                client.clone(),
                QuotaWaitConfig {
                    max_attempts: 50,
                    buffer_secs: 0,
                    fallback_secs: WINDOW_SECS as u64,
                },
            );
            while Instant::now() < deadline {
                let client = Arc::clone(&client);
                let outcome = coordinator
                    .run(ApiGroup::Completion, || {
                        let client = Arc::clone(&client);
                        async move { lock_and_report(&client, 1000).await }
                    })
                    .await;
                // A run can overshoot the deadline while sleeping out a
                // denial; only count admissions inside the window of
                // observation.
                if outcome.is_ok() && Instant::now() < deadline {
                    successes.fetch_add(1, Ordering::SeqCst);
                }
            }
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    // Five admissions per window over two-to-four observed windows. Well
    // below the 25 a single unshaped window would allow.
    let total = successes.load(Ordering::SeqCst);
    assert!(
        (10..=20).contains(&total),
        "expected 5 admissions per window over 2..4 windows, got {total}"
    );

    // Nothing left held once the loops stop reporting.
    let status = client_for(&base_url, "observer").status().await.unwrap();
    assert_eq!(status.locked_tokens, 0);
    assert!(status.used_tokens <= 5000);
}
