//! Counter HTTP server.

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tracing::info;

use crate::domain::models::CounterConfig;
use crate::infrastructure::counter::handlers::{self, AppState};
use crate::infrastructure::counter::state::CounterState;

/// Build the counter's router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/lock", post(handlers::lock_completion))
        .route("/report", post(handlers::report_completion))
        .route("/release", post(handlers::release_completion))
        .route("/status", get(handlers::status_completion))
        .route("/embedding/lock", post(handlers::lock_embedding))
        .route("/embedding/report", post(handlers::report_embedding))
        .route("/embedding/release", post(handlers::release_embedding))
        .route("/embedding/status", get(handlers::status_embedding))
        .route("/transcription/lock", post(handlers::lock_transcription))
        .route("/transcription/report", post(handlers::report_transcription))
        .route("/transcription/release", post(handlers::release_transcription))
        .route("/transcription/status", get(handlers::status_transcription))
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// Start the counter service and serve until the process exits.
pub async fn serve(config: &CounterConfig) -> Result<()> {
    info!("Starting Floodgate counter service");
    info!(
        completion_tokens = config.completion.tokens_per_minute,
        completion_requests = config.completion.requests_per_minute,
        embedding_tokens = config.embedding.tokens_per_minute,
        embedding_requests = config.embedding.requests_per_minute,
        transcription_requests = config.transcription.requests_per_minute,
        "Per-minute limits"
    );

    let state = AppState {
        counter: Arc::new(CounterState::new(config)),
    };
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind counter listener on {addr}"))?;

    info!("Counter service listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Counter server terminated")?;

    info!("Counter service stopped");
    Ok(())
}

/// Resolve on SIGINT. Budgets are memoryless, so shutdown needs no
/// draining beyond closing the listener.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to install shutdown handler");
    }
}
