//! Provider-call cost estimation.
//!
//! Reservations are acquired before the provider call, so the cost must be
//! estimated up front: a byte-pair token count for completions and
//! embeddings (chat adds a reserve for the unknown output length), and a
//! flat one-request cost for transcription.

use anyhow::{Context, Result};
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Byte-pair cost estimator shared by every handler in a worker process.
pub struct CostEstimator {
    bpe: CoreBPE,
    completion_reserve: u64,
}

impl CostEstimator {
    /// Build an estimator with the given completion-output reserve.
    pub fn new(completion_reserve: u64) -> Result<Self> {
        let bpe = cl100k_base().context("Failed to load cl100k_base tokenizer")?;
        Ok(Self {
            bpe,
            completion_reserve,
        })
    }

    /// Token count of one text.
    pub fn count_tokens(&self, text: &str) -> u64 {
        self.bpe.encode_with_special_tokens(text).len() as u64
    }

    /// Tokens to reserve for a chat completion: the prompt's count plus the
    /// configured reserve for the not-yet-known output.
    pub fn completion_cost(&self, prompt: &str) -> u64 {
        self.count_tokens(prompt)
            .saturating_add(self.completion_reserve)
            .max(1)
    }

    /// Tokens to reserve for an embedding batch.
    pub fn embedding_cost(&self, texts: &[String]) -> u64 {
        texts
            .iter()
            .map(|text| self.count_tokens(text))
            .sum::<u64>()
            .max(1)
    }
}
