//! Floodgate - distributed quota counter and admission control
//!
//! A fleet of worker services funnels work through LLM and speech-to-text
//! APIs under strict per-minute provider quotas. Floodgate provides:
//! - A counter service arbitrating tumbling-minute token and request budgets
//! - The reservation client workers use to lock, report, and release
//! - The quota-wait coordinator that turns denials into targeted sleeps
//! - The worker pipeline skeleton exercising the protocol end-to-end

pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use infrastructure::counter::{CounterClient, CounterState};
pub use services::quota_wait::QuotaWait;
