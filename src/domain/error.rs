//! Domain error types for the admission-control pipeline.
//!
//! Errors fall into disjoint kinds with disjoint policy: quota denials are
//! absorbed by the quota-wait coordinator, validation errors surface
//! immediately so the broker's dead-letter policy can engage, and everything
//! else abandons the message for redelivery.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::ApiGroup;

/// Errors surfaced while processing one queue message.
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    /// Our own counter refused the reservation. The only error kind the
    /// quota-wait coordinator swallows; everything else propagates.
    #[error("{reason}")]
    QuotaDenied {
        group: ApiGroup,
        /// Denial message from the counter, e.g. "token limit would be exceeded".
        reason: String,
        /// Reset horizon the counter attached to the denial, if any.
        seconds_until_reset: Option<u64>,
    },

    /// Malformed job payload or counts the counter rejected outright.
    #[error("invalid job: {0}")]
    Validation(String),

    /// The counter could not be reached or answered outside the protocol.
    #[error("counter call failed: {0}")]
    Counter(String),

    /// The provider call failed after the client's own transient retries.
    #[error("provider call failed: {0}")]
    Provider(String),
}

impl ProcessError {
    /// Returns true if this error is a quota denial the coordinator should
    /// translate into a sleep until window roll-over.
    pub const fn is_quota_denial(&self) -> bool {
        matches!(self, Self::QuotaDenied { .. })
    }

    /// The API group whose window refused the reservation, if any.
    pub const fn quota_group(&self) -> Option<ApiGroup> {
        match self {
            Self::QuotaDenied { group, .. } => Some(*group),
            _ => None,
        }
    }
}

/// Errors from the queue broker port.
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("queue receive failed: {0}")]
    ReceiveFailed(String),

    #[error("queue send failed: {0}")]
    SendFailed(String),

    /// The visibility lock expired or the message was already settled; the
    /// broker will redeliver it.
    #[error("message lock lost: {0}")]
    LockLost(Uuid),
}

impl QueueError {
    /// Returns true if this error is transient and could succeed on retry
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ReceiveFailed(_) | Self::SendFailed(_))
    }
}
