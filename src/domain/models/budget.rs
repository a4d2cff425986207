//! Budget identity, reservation, and snapshot types.
//!
//! Shared between the counter service, the reservation client, and the
//! worker pipeline. Budget *state* lives exclusively inside the counter
//! process; clients only ever see handles and snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The quota pools the counter arbitrates.
///
/// Completion and embedding each pair a token pool with a request pool;
/// transcription is metered by request count alone (one audio file is one
/// request with no token cost).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetKind {
    CompletionTokens,
    CompletionRequests,
    EmbeddingTokens,
    EmbeddingRequests,
    TranscriptionRequests,
}

impl BudgetKind {
    /// Stable identifier used in log events and wire errors.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CompletionTokens => "completion-tokens",
            Self::CompletionRequests => "completion-requests",
            Self::EmbeddingTokens => "embedding-tokens",
            Self::EmbeddingRequests => "embedding-requests",
            Self::TranscriptionRequests => "transcription-requests",
        }
    }
}

impl fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The counter's public URL groups.
///
/// Each group maps to one endpoint family (`/lock`, `/embedding/lock`,
/// `/transcription/lock`, ...) and one window the quota-wait coordinator
/// sleeps against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiGroup {
    Completion,
    Embedding,
    Transcription,
}

impl ApiGroup {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Embedding => "embedding",
            Self::Transcription => "transcription",
        }
    }

    /// URL prefix for this group's endpoints on the counter service.
    pub const fn url_prefix(self) -> &'static str {
        match self {
            Self::Completion => "",
            Self::Embedding => "/embedding",
            Self::Transcription => "/transcription",
        }
    }
}

impl fmt::Display for ApiGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outstanding (not yet committed) consumption of budget capacity.
#[derive(Debug, Clone)]
pub struct Reservation {
    /// Free-form identifier of the worker that acquired the reservation.
    pub client_id: String,
    /// Amount held against the window.
    pub amount: u64,
    /// When the reservation was acquired.
    pub acquired_at: DateTime<Utc>,
}

/// Point-in-time view of one budget's window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub kind: BudgetKind,
    /// Configured per-window limit.
    pub limit: u64,
    /// Usage reported this window. May transiently exceed `limit` when a
    /// report over-consumes beyond its reservation.
    pub committed: u64,
    /// Sum of outstanding reservations this window.
    pub held: u64,
    /// `limit - committed - held`, floored at zero.
    pub available: u64,
    /// Whole seconds until the window rolls, always in `(0, window]`.
    pub seconds_until_reset: u64,
}

/// Snapshot of a token+request budget pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSnapshot {
    pub tokens: BudgetSnapshot,
    pub requests: BudgetSnapshot,
}

impl PairSnapshot {
    /// Effective reset horizon for the pair: the earlier of the two halves.
    pub fn seconds_until_reset(&self) -> u64 {
        self.tokens
            .seconds_until_reset
            .min(self.requests.seconds_until_reset)
    }
}

/// Separator between the two halves of a compound reservation handle.
pub const HANDLE_SEPARATOR: char = ':';

/// A reservation handle for a paired budget, parsed from or rendered to the
/// compound wire form `"{tokens_handle}:{requests_handle}"`.
///
/// Either half may be absent; the counter and the client both treat a
/// missing half as benign and settle whatever is present.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PairHandle {
    pub tokens: Option<String>,
    pub requests: Option<String>,
}

impl PairHandle {
    pub fn new(tokens: impl Into<String>, requests: impl Into<String>) -> Self {
        Self {
            tokens: Some(tokens.into()),
            requests: Some(requests.into()),
        }
    }

    /// Parse the compound wire form. A bare handle (no separator) is taken
    /// to be the token half; empty halves become `None`.
    pub fn parse(raw: &str) -> Self {
        let (tokens, requests) = match raw.split_once(HANDLE_SEPARATOR) {
            Some((t, r)) => (t, r),
            None => (raw, ""),
        };
        Self {
            tokens: (!tokens.is_empty()).then(|| tokens.to_string()),
            requests: (!requests.is_empty()).then(|| requests.to_string()),
        }
    }

    /// Render the compound wire form stored by clients.
    pub fn encode(&self) -> String {
        format!(
            "{}{HANDLE_SEPARATOR}{}",
            self.tokens.as_deref().unwrap_or_default(),
            self.requests.as_deref().unwrap_or_default()
        )
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_none() && self.requests.is_none()
    }
}
