//! Domain models shared across the counter, client, and worker layers.

pub mod budget;
pub mod config;
pub mod message;

pub use budget::{
    ApiGroup, BudgetKind, BudgetSnapshot, PairHandle, PairSnapshot, Reservation, HANDLE_SEPARATOR,
};
pub use config::{
    ClientConfig, Config, CounterConfig, LogConfig, LogFormat, PairLimits, ProviderConfig,
    RequestLimit, WorkerSettings,
};
pub use message::{
    CompletionJob, CompletionResult, EmbeddingJob, EmbeddingResult, LeasedMessage,
    TranscriptionJob, TranscriptionResult,
};
