//! Counter process state: the budgets, and nothing else.
//!
//! The counter exclusively owns every budget; there is no persistence and
//! no background task. A restart starts every window empty at the new
//! minute boundary.

use chrono::Duration;

use crate::domain::models::{BudgetKind, CounterConfig};
use crate::services::budget_pair::BudgetPair;
use crate::services::window_budget::WindowBudget;

/// The four paired pools plus the requests-only transcription pool.
pub struct CounterState {
    pub completion: BudgetPair,
    pub embedding: BudgetPair,
    pub transcription: WindowBudget,
}

impl CounterState {
    /// Build the production state with standard 60-second windows.
    pub fn new(config: &CounterConfig) -> Self {
        Self::with_window(
            config,
            Duration::seconds(crate::services::window_budget::DEFAULT_WINDOW_SECS),
        )
    }

    /// Build state with a custom window length, for drills and tests.
    pub fn with_window(config: &CounterConfig, window: Duration) -> Self {
        Self {
            completion: BudgetPair::new(
                WindowBudget::with_window(
                    BudgetKind::CompletionTokens,
                    config.completion.tokens_per_minute,
                    window,
                ),
                WindowBudget::with_window(
                    BudgetKind::CompletionRequests,
                    config.completion.requests_per_minute,
                    window,
                ),
            ),
            embedding: BudgetPair::new(
                WindowBudget::with_window(
                    BudgetKind::EmbeddingTokens,
                    config.embedding.tokens_per_minute,
                    window,
                ),
                WindowBudget::with_window(
                    BudgetKind::EmbeddingRequests,
                    config.embedding.requests_per_minute,
                    window,
                ),
            ),
            transcription: WindowBudget::with_window(
                BudgetKind::TranscriptionRequests,
                config.transcription.requests_per_minute,
                window,
            ),
        }
    }
}
