//! Queue broker port.

use async_trait::async_trait;

use crate::domain::error::QueueError;
use crate::domain::models::LeasedMessage;

/// At-least-once message bus with per-message visibility locks.
///
/// Settlement acknowledges a message permanently; abandonment returns it for
/// redelivery. A lease is exclusive until settled, abandoned, or its
/// visibility lock expires.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Lease up to `max_messages` messages. Returns an empty batch when the
    /// queue has nothing deliverable.
    async fn receive(&self, max_messages: usize) -> Result<Vec<LeasedMessage>, QueueError>;

    /// Acknowledge a leased message; it will never be delivered again.
    async fn settle(&self, message: &LeasedMessage) -> Result<(), QueueError>;

    /// Return a leased message to the queue for redelivery.
    async fn abandon(&self, message: &LeasedMessage) -> Result<(), QueueError>;

    /// Extend the visibility lock of a leased message.
    async fn renew_lock(&self, message: &LeasedMessage) -> Result<(), QueueError>;

    /// Enqueue a fresh message.
    async fn send(&self, body: String) -> Result<(), QueueError>;
}
