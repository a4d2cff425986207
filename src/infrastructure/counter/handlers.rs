//! Axum handlers for the counter's HTTP surface.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use tracing::debug;

use crate::domain::models::PairHandle;
use crate::infrastructure::counter::state::CounterState;
use crate::infrastructure::counter::types::{
    AckResponse, ErrorResponse, HealthResponse, LockRequest, LockResponse, ReleaseRequest,
    ReportRequest, RequestStatusResponse, StatusResponse, TranscriptionLockRequest,
    TranscriptionReportRequest,
};
use crate::services::budget_pair::{BudgetPair, PairLockOutcome};
use crate::services::window_budget::LockOutcome;

/// Denial message for the requests-only transcription pool.
const REQUEST_LIMIT_MESSAGE: &str = "rate limit would be exceeded";

/// Shared application state for the counter server.
#[derive(Clone)]
pub struct AppState {
    pub counter: Arc<CounterState>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

// -------------------------------------------------------------------------
// Completion group
// -------------------------------------------------------------------------

pub async fn lock_completion(
    State(state): State<AppState>,
    Json(request): Json<LockRequest>,
) -> Response {
    pair_lock(&state.counter.completion, &request).await
}

pub async fn report_completion(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> Json<AckResponse> {
    pair_report(&state.counter.completion, &request).await
}

pub async fn release_completion(
    State(state): State<AppState>,
    Json(request): Json<ReleaseRequest>,
) -> Json<AckResponse> {
    pair_release(&state.counter.completion, &request).await
}

pub async fn status_completion(State(state): State<AppState>) -> Json<StatusResponse> {
    pair_status(&state.counter.completion).await
}

// -------------------------------------------------------------------------
// Embedding group
// -------------------------------------------------------------------------

pub async fn lock_embedding(
    State(state): State<AppState>,
    Json(request): Json<LockRequest>,
) -> Response {
    pair_lock(&state.counter.embedding, &request).await
}

pub async fn report_embedding(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> Json<AckResponse> {
    pair_report(&state.counter.embedding, &request).await
}

pub async fn release_embedding(
    State(state): State<AppState>,
    Json(request): Json<ReleaseRequest>,
) -> Json<AckResponse> {
    pair_release(&state.counter.embedding, &request).await
}

pub async fn status_embedding(State(state): State<AppState>) -> Json<StatusResponse> {
    pair_status(&state.counter.embedding).await
}

// -------------------------------------------------------------------------
// Transcription group (requests only)
// -------------------------------------------------------------------------

pub async fn lock_transcription(
    State(state): State<AppState>,
    Json(request): Json<TranscriptionLockRequest>,
) -> Response {
    debug!(app_id = %request.app_id, "transcription lock");
    match state.counter.transcription.lock(&request.app_id, 1).await {
        LockOutcome::Allowed {
            handle,
            seconds_until_reset,
            ..
        } => Json(LockResponse {
            allowed: true,
            request_id: Some(handle),
            rate_request_id: None,
            seconds_until_reset: Some(seconds_until_reset),
            error: None,
        })
        .into_response(),
        LockOutcome::Denied {
            seconds_until_reset,
        } => Json(LockResponse {
            allowed: false,
            request_id: None,
            rate_request_id: None,
            seconds_until_reset: Some(seconds_until_reset),
            error: Some(REQUEST_LIMIT_MESSAGE.to_string()),
        })
        .into_response(),
        LockOutcome::Invalid { reason } => validation_error(reason),
    }
}

pub async fn report_transcription(
    State(state): State<AppState>,
    Json(request): Json<TranscriptionReportRequest>,
) -> Json<AckResponse> {
    // One file is one request; the report commits exactly one slot.
    state
        .counter
        .transcription
        .report(&request.request_id, 1)
        .await;
    Json(AckResponse { success: true })
}

pub async fn release_transcription(
    State(state): State<AppState>,
    Json(request): Json<ReleaseRequest>,
) -> Json<AckResponse> {
    state
        .counter
        .transcription
        .release(&request.request_id)
        .await;
    Json(AckResponse { success: true })
}

pub async fn status_transcription(State(state): State<AppState>) -> Json<RequestStatusResponse> {
    let snapshot = state.counter.transcription.status().await;
    Json(RequestStatusResponse {
        available_requests: snapshot.available,
        used_requests: snapshot.committed,
        locked_requests: snapshot.held,
        reset_time_seconds: snapshot.seconds_until_reset,
    })
}

// -------------------------------------------------------------------------
// Shared pair plumbing
// -------------------------------------------------------------------------

async fn pair_lock(pair: &BudgetPair, request: &LockRequest) -> Response {
    debug!(
        app_id = %request.app_id,
        token_count = request.token_count,
        kind = %pair.tokens().kind(),
        "pair lock"
    );
    match pair.lock(&request.app_id, request.token_count).await {
        PairLockOutcome::Allowed {
            handle,
            seconds_until_reset,
        } => {
            let rate_request_id = handle.requests.clone();
            Json(LockResponse {
                allowed: true,
                request_id: Some(handle.encode()),
                rate_request_id,
                seconds_until_reset: Some(seconds_until_reset),
                error: None,
            })
            .into_response()
        }
        PairLockOutcome::Denied {
            kind,
            seconds_until_reset,
        } => Json(LockResponse {
            allowed: false,
            request_id: None,
            rate_request_id: None,
            seconds_until_reset: Some(seconds_until_reset),
            error: Some(kind.message().to_string()),
        })
        .into_response(),
        PairLockOutcome::Invalid { reason } => validation_error(reason),
    }
}

async fn pair_report(pair: &BudgetPair, request: &ReportRequest) -> Json<AckResponse> {
    let handle = wire_handle(&request.request_id, request.rate_request_id.as_deref());
    let used = request
        .prompt_tokens
        .max(0)
        .saturating_add(request.completion_tokens.max(0));
    pair.report(&handle, used).await;
    Json(AckResponse { success: true })
}

async fn pair_release(pair: &BudgetPair, request: &ReleaseRequest) -> Json<AckResponse> {
    let handle = wire_handle(&request.request_id, request.rate_request_id.as_deref());
    pair.release(&handle).await;
    Json(AckResponse { success: true })
}

async fn pair_status(pair: &BudgetPair) -> Json<StatusResponse> {
    let snapshot = pair.status().await;
    let reset_time_seconds = snapshot.seconds_until_reset();
    Json(StatusResponse {
        available_tokens: snapshot.tokens.available,
        used_tokens: snapshot.tokens.committed,
        locked_tokens: snapshot.tokens.held,
        available_requests: snapshot.requests.available,
        used_requests: snapshot.requests.committed,
        locked_requests: snapshot.requests.held,
        reset_time_seconds,
    })
}

/// Reassemble a pair handle from the wire: `request_id` may be compound or
/// the bare token half, with the request half optionally carried separately.
fn wire_handle(request_id: &str, rate_request_id: Option<&str>) -> PairHandle {
    let mut handle = PairHandle::parse(request_id);
    if handle.requests.is_none() {
        handle.requests = rate_request_id
            .filter(|id| !id.is_empty())
            .map(ToString::to_string);
    }
    handle
}

fn validation_error(reason: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: reason })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_handle_prefers_compound_form() {
        let handle = wire_handle("tok:req", Some("other"));
        assert_eq!(handle.tokens.as_deref(), Some("tok"));
        assert_eq!(handle.requests.as_deref(), Some("req"));
    }

    #[test]
    fn test_wire_handle_falls_back_to_rate_field() {
        let handle = wire_handle("tok", Some("req"));
        assert_eq!(handle.tokens.as_deref(), Some("tok"));
        assert_eq!(handle.requests.as_deref(), Some("req"));
    }

    #[test]
    fn test_wire_handle_tolerates_missing_halves() {
        let handle = wire_handle("tok", None);
        assert_eq!(handle.tokens.as_deref(), Some("tok"));
        assert!(handle.requests.is_none());
    }
}
