//! Infrastructure layer
//!
//! Contains adapters and implementations for external dependencies:
//! - Counter service and its reservation client (axum + reqwest)
//! - Provider API client (chat, embeddings, transcription)
//! - Queue broker adapters
//! - Configuration loading and tracing setup

pub mod config;
pub mod counter;
pub mod logging;
pub mod provider;
pub mod queue;
