//! Job processor port.

use async_trait::async_trait;

use crate::domain::error::ProcessError;
use crate::domain::models::{ApiGroup, LeasedMessage};

/// Domain-specific handler for one message kind.
///
/// A processor owns the full reserve-invoke-report contract for its provider
/// call: estimate the cost, lock it on the counter, invoke the provider,
/// report actual usage on success, and release the reservation on any
/// provider failure. The worker wraps every call in the quota-wait
/// coordinator, so a processor signals denial by returning
/// [`ProcessError::QuotaDenied`] rather than sleeping itself.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    /// The API group whose window governs this processor's provider calls.
    fn group(&self) -> ApiGroup;

    /// Process one leased message and return the output message body.
    async fn process(&self, message: &LeasedMessage) -> Result<String, ProcessError>;
}
