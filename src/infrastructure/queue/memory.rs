//! In-memory queue with at-least-once delivery and visibility locks.
//!
//! Stands in for the external broker in tests and local drills. Delivery
//! semantics mirror the production bus: a received message is invisible
//! until settled, abandoned, or its visibility lock expires, after which it
//! is redelivered with an incremented delivery count.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::domain::error::QueueError;
use crate::domain::models::LeasedMessage;
use crate::domain::ports::MessageQueue;

struct StoredMessage {
    id: Uuid,
    body: String,
    delivery_count: u32,
}

struct LeasedEntry {
    message: StoredMessage,
    lock_expires: Instant,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    leased: HashMap<Uuid, LeasedEntry>,
}

/// Process-local broker with per-message visibility locks.
pub struct InMemoryQueue {
    visibility: Duration,
    state: Mutex<QueueState>,
}

impl InMemoryQueue {
    pub fn new(visibility: Duration) -> Self {
        Self {
            visibility,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Messages currently deliverable (not leased).
    pub async fn depth(&self) -> usize {
        let mut state = self.state.lock().await;
        Self::reclaim_expired(&mut state);
        state.ready.len()
    }

    /// Messages currently held under a visibility lock.
    pub async fn leased_count(&self) -> usize {
        let mut state = self.state.lock().await;
        Self::reclaim_expired(&mut state);
        state.leased.len()
    }

    /// Drain every deliverable message body, oldest first.
    pub async fn drain(&self) -> Vec<String> {
        let mut state = self.state.lock().await;
        Self::reclaim_expired(&mut state);
        state.ready.drain(..).map(|m| m.body).collect()
    }

    /// Move leases whose visibility lock expired back to the ready queue.
    fn reclaim_expired(state: &mut QueueState) {
        let now = Instant::now();
        let expired: Vec<Uuid> = state
            .leased
            .iter()
            .filter(|(_, entry)| entry.lock_expires <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some(entry) = state.leased.remove(&id) {
                debug!(message_id = %id, "visibility lock expired; redelivering");
                state.ready.push_back(entry.message);
            }
        }
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn receive(&self, max_messages: usize) -> Result<Vec<LeasedMessage>, QueueError> {
        let mut state = self.state.lock().await;
        Self::reclaim_expired(&mut state);

        let mut batch = Vec::new();
        while batch.len() < max_messages {
            let Some(mut stored) = state.ready.pop_front() else {
                break;
            };
            stored.delivery_count += 1;
            batch.push(LeasedMessage {
                id: stored.id,
                body: stored.body.clone(),
                delivery_count: stored.delivery_count,
            });
            state.leased.insert(
                stored.id,
                LeasedEntry {
                    message: stored,
                    lock_expires: Instant::now() + self.visibility,
                },
            );
        }
        Ok(batch)
    }

    async fn settle(&self, message: &LeasedMessage) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state
            .leased
            .remove(&message.id)
            .map(|_| ())
            .ok_or(QueueError::LockLost(message.id))
    }

    async fn abandon(&self, message: &LeasedMessage) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let entry = state
            .leased
            .remove(&message.id)
            .ok_or(QueueError::LockLost(message.id))?;
        state.ready.push_back(entry.message);
        Ok(())
    }

    async fn renew_lock(&self, message: &LeasedMessage) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let entry = state
            .leased
            .get_mut(&message.id)
            .ok_or(QueueError::LockLost(message.id))?;
        entry.lock_expires = Instant::now() + self.visibility;
        Ok(())
    }

    async fn send(&self, body: String) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.ready.push_back(StoredMessage {
            id: Uuid::new_v4(),
            body,
            delivery_count: 0,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receive_leases_exclusively() {
        let queue = InMemoryQueue::new(Duration::from_secs(30));
        queue.send("a".to_string()).await.unwrap();

        let batch = queue.receive(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].delivery_count, 1);

        // Leased messages are invisible to further receives.
        assert!(queue.receive(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settle_is_terminal() {
        let queue = InMemoryQueue::new(Duration::from_secs(30));
        queue.send("a".to_string()).await.unwrap();

        let batch = queue.receive(1).await.unwrap();
        queue.settle(&batch[0]).await.unwrap();

        assert_eq!(queue.depth().await, 0);
        assert_eq!(queue.leased_count().await, 0);
    }

    #[tokio::test]
    async fn test_abandon_redelivers_with_bumped_count() {
        let queue = InMemoryQueue::new(Duration::from_secs(30));
        queue.send("a".to_string()).await.unwrap();

        let batch = queue.receive(1).await.unwrap();
        queue.abandon(&batch[0]).await.unwrap();

        let redelivered = queue.receive(1).await.unwrap();
        assert_eq!(redelivered[0].id, batch[0].id);
        assert_eq!(redelivered[0].delivery_count, 2);
    }

    #[tokio::test]
    async fn test_expired_lock_redelivers() {
        let queue = InMemoryQueue::new(Duration::from_millis(20));
        queue.send("a".to_string()).await.unwrap();

        let batch = queue.receive(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let redelivered = queue.receive(1).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].delivery_count, 2);

        // The original lease is gone; settling it reports the lost lock.
        assert!(matches!(
            queue.settle(&batch[0]).await,
            Err(QueueError::LockLost(_))
        ));
    }

    #[tokio::test]
    async fn test_renew_extends_visibility() {
        let queue = InMemoryQueue::new(Duration::from_millis(50));
        queue.send("a".to_string()).await.unwrap();

        let batch = queue.receive(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        queue.renew_lock(&batch[0]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Still leased thanks to the renewal.
        assert_eq!(queue.depth().await, 0);
        queue.settle(&batch[0]).await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_respects_batch_size() {
        let queue = InMemoryQueue::new(Duration::from_secs(30));
        for i in 0..5 {
            queue.send(format!("m{i}")).await.unwrap();
        }
        let batch = queue.receive(3).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(queue.depth().await, 2);
    }
}
