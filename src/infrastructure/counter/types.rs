//! Wire types for the counter's HTTP surface.
//!
//! Shared by the axum handlers and the reservation client so both ends
//! agree on field names. Quota denial travels as an `allowed=false` 2xx
//! body, never as an HTTP error status; non-2xx responses carry
//! [`ErrorResponse`].

use serde::{Deserialize, Serialize};

/// Body of `POST /lock` and `POST /embedding/lock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequest {
    pub app_id: String,
    /// Forwarded verbatim by clients; the counter rejects non-positive
    /// values as validation errors.
    #[serde(default)]
    pub token_count: i64,
}

/// Body of `POST /transcription/lock`: one request slot, no token cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionLockRequest {
    pub app_id: String,
}

/// Response to every lock endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockResponse {
    pub allowed: bool,
    /// The handle the client stores: compound (`tokens:requests`) for the
    /// paired groups, bare for transcription.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// The request half on its own, for callers that track it separately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_until_reset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `POST /report` and `POST /embedding/report`.
///
/// The embedding group omits `completion_tokens` (embeddings have no output
/// dimension); it defaults to zero here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub app_id: String,
    /// Compound or token-half handle; a missing half is benign.
    pub request_id: String,
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_request_id: Option<String>,
}

/// Body of `POST /transcription/report`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionReportRequest {
    pub app_id: String,
    pub request_id: String,
}

/// Body of every release endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub app_id: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_request_id: Option<String>,
}

/// Response to `GET /status` and `GET /embedding/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub available_tokens: u64,
    pub used_tokens: u64,
    pub locked_tokens: u64,
    pub available_requests: u64,
    pub used_requests: u64,
    pub locked_requests: u64,
    /// Effective reset horizon: the earlier of the two windows.
    pub reset_time_seconds: u64,
}

/// Response to `GET /transcription/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStatusResponse {
    pub available_requests: u64,
    pub used_requests: u64,
    pub locked_requests: u64,
    pub reset_time_seconds: u64,
}

/// Response to report and release endpoints; always `success: true`, even
/// for handles the window already reclaimed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

/// Response to `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
