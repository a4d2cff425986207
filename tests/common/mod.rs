//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use floodgate::domain::models::{ClientConfig, CounterConfig, PairLimits, RequestLimit};
use floodgate::infrastructure::counter::{server, AppState, CounterClient, CounterState};

/// Spawn a counter service on an ephemeral port and return its base URL.
///
/// `window_secs` shortens the tumbling window so time-dependent scenarios
/// run in test time instead of wall-clock minutes.
pub async fn spawn_counter(config: &CounterConfig, window_secs: i64) -> String {
    let state = AppState {
        counter: Arc::new(CounterState::with_window(
            config,
            chrono::Duration::seconds(window_secs),
        )),
    };
    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("counter server");
    });
    format!("http://{addr}")
}

/// Counter limits tailored per test.
pub fn counter_config(
    completion: (u64, u64),
    embedding: (u64, u64),
    transcription_requests: u64,
) -> CounterConfig {
    CounterConfig {
        port: 0,
        completion: PairLimits {
            tokens_per_minute: completion.0,
            requests_per_minute: completion.1,
        },
        embedding: PairLimits {
            tokens_per_minute: embedding.0,
            requests_per_minute: embedding.1,
        },
        transcription: RequestLimit {
            requests_per_minute: transcription_requests,
        },
    }
}

/// A reservation client pointed at a spawned counter.
pub fn client_for(base_url: &str, app_id: &str) -> CounterClient {
    CounterClient::new(&ClientConfig {
        base_url: base_url.to_string(),
        app_id: app_id.to_string(),
        timeout_secs: 5,
    })
    .expect("build counter client")
}
