//! Reservation client: the worker-side half of the counter protocol.
//!
//! Instantiated once per worker process. The compound handle returned by a
//! lock is preserved end-to-end; it is split into its two halves only while
//! constructing report and release payloads. No retries happen at this
//! layer: network errors, non-2xx responses, and decode failures surface
//! as structured errors for the caller to classify.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::domain::models::{ApiGroup, ClientConfig, PairHandle};
use crate::infrastructure::counter::types::{
    AckResponse, LockRequest, LockResponse, ReleaseRequest, ReportRequest, RequestStatusResponse,
    StatusResponse, TranscriptionLockRequest, TranscriptionReportRequest,
};
use crate::services::quota_wait::ResetQuery;

/// Errors from one counter HTTP call.
#[derive(Error, Debug, Clone)]
pub enum CounterClientError {
    /// Connection failed, timed out, or was interrupted.
    #[error("counter request failed: {0}")]
    Network(String),

    /// The counter answered outside the protocol (4xx/5xx).
    #[error("counter returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The counter answered 2xx with a body we could not decode.
    #[error("failed to decode counter response: {0}")]
    Decode(String),
}

/// HTTP client for the counter's lock/report/release/status surface.
pub struct CounterClient {
    http: ReqwestClient,
    base_url: String,
    app_id: String,
}

impl CounterClient {
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let http = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build counter HTTP client: {e}"))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
        })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    // ---------------------------------------------------------------------
    // Completion group
    // ---------------------------------------------------------------------

    /// Reserve `token_count` completion tokens plus one request slot.
    pub async fn lock(&self, token_count: i64) -> Result<LockResponse, CounterClientError> {
        self.lock_group(ApiGroup::Completion, token_count).await
    }

    /// Commit actual completion usage; always settles one request slot.
    pub async fn report(
        &self,
        handle: &str,
        prompt_tokens: i64,
        completion_tokens: i64,
    ) -> Result<(), CounterClientError> {
        let split = PairHandle::parse(handle);
        let body = ReportRequest {
            app_id: self.app_id.clone(),
            request_id: split.tokens.unwrap_or_default(),
            prompt_tokens,
            completion_tokens,
            rate_request_id: split.requests,
        };
        let _: AckResponse = self.post_json("/report", &body).await?;
        Ok(())
    }

    /// Drop both halves of a completion reservation.
    pub async fn release(&self, handle: &str) -> Result<(), CounterClientError> {
        self.release_group(ApiGroup::Completion, handle).await
    }

    pub async fn status(&self) -> Result<StatusResponse, CounterClientError> {
        self.get_json("/status").await
    }

    // ---------------------------------------------------------------------
    // Embedding group
    // ---------------------------------------------------------------------

    pub async fn lock_embedding(
        &self,
        token_count: i64,
    ) -> Result<LockResponse, CounterClientError> {
        self.lock_group(ApiGroup::Embedding, token_count).await
    }

    /// Commit actual embedding usage; embeddings have no output dimension,
    /// so only prompt tokens are reported.
    pub async fn report_embedding(
        &self,
        handle: &str,
        prompt_tokens: i64,
    ) -> Result<(), CounterClientError> {
        let split = PairHandle::parse(handle);
        let body = ReportRequest {
            app_id: self.app_id.clone(),
            request_id: split.tokens.unwrap_or_default(),
            prompt_tokens,
            completion_tokens: 0,
            rate_request_id: split.requests,
        };
        let _: AckResponse = self.post_json("/embedding/report", &body).await?;
        Ok(())
    }

    pub async fn release_embedding(&self, handle: &str) -> Result<(), CounterClientError> {
        self.release_group(ApiGroup::Embedding, handle).await
    }

    pub async fn status_embedding(&self) -> Result<StatusResponse, CounterClientError> {
        self.get_json("/embedding/status").await
    }

    // ---------------------------------------------------------------------
    // Transcription group
    // ---------------------------------------------------------------------

    /// Reserve one transcription request slot.
    pub async fn lock_transcription(&self) -> Result<LockResponse, CounterClientError> {
        let body = TranscriptionLockRequest {
            app_id: self.app_id.clone(),
        };
        self.post_json("/transcription/lock", &body).await
    }

    pub async fn report_transcription(&self, handle: &str) -> Result<(), CounterClientError> {
        let body = TranscriptionReportRequest {
            app_id: self.app_id.clone(),
            request_id: handle.to_string(),
        };
        let _: AckResponse = self.post_json("/transcription/report", &body).await?;
        Ok(())
    }

    pub async fn release_transcription(&self, handle: &str) -> Result<(), CounterClientError> {
        let body = ReleaseRequest {
            app_id: self.app_id.clone(),
            request_id: handle.to_string(),
            rate_request_id: None,
        };
        let _: AckResponse = self.post_json("/transcription/release", &body).await?;
        Ok(())
    }

    pub async fn status_transcription(
        &self,
    ) -> Result<RequestStatusResponse, CounterClientError> {
        self.get_json("/transcription/status").await
    }

    // ---------------------------------------------------------------------
    // Plumbing
    // ---------------------------------------------------------------------

    async fn lock_group(
        &self,
        group: ApiGroup,
        token_count: i64,
    ) -> Result<LockResponse, CounterClientError> {
        let body = LockRequest {
            app_id: self.app_id.clone(),
            token_count,
        };
        self.post_json(&format!("{}/lock", group.url_prefix()), &body)
            .await
    }

    async fn release_group(
        &self,
        group: ApiGroup,
        handle: &str,
    ) -> Result<(), CounterClientError> {
        let split = PairHandle::parse(handle);
        let body = ReleaseRequest {
            app_id: self.app_id.clone(),
            request_id: split.tokens.unwrap_or_default(),
            rate_request_id: split.requests,
        };
        let _: AckResponse = self
            .post_json(&format!("{}/release", group.url_prefix()), &body)
            .await?;
        Ok(())
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, CounterClientError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| CounterClientError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, CounterClientError> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .map_err(|e| CounterClientError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<R: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<R, CounterClientError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error response".to_string());
            return Err(CounterClientError::Status {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|e| CounterClientError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ResetQuery for CounterClient {
    async fn seconds_until_reset(&self, group: ApiGroup) -> Option<u64> {
        match group {
            ApiGroup::Completion => self.status().await.ok().map(|s| s.reset_time_seconds),
            ApiGroup::Embedding => self
                .status_embedding()
                .await
                .ok()
                .map(|s| s.reset_time_seconds),
            ApiGroup::Transcription => self
                .status_transcription()
                .await
                .ok()
                .map(|s| s.reset_time_seconds),
        }
    }
}
