use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{MessagingError, MessagingResult};
use crate::message::TransportMessage;
use crate::traits::MessageSender;

/// A message held by [`InMemoryMessageSender`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub body: String,
    pub visible_at: DateTime<Utc>,
}

/// In-process message sender for tests and the `memory://` backend.
#[derive(Debug, Default)]
pub struct InMemoryMessageSender {
    queues: Mutex<HashMap<String, Vec<QueuedMessage>>>,
}

impl InMemoryMessageSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message sent to `queue`, in send order.
    pub async fn messages(&self, queue: &str) -> Vec<QueuedMessage> {
        self.queues
            .lock()
            .await
            .get(queue)
            .cloned()
            .unwrap_or_default()
    }

    /// Messages of `queue` whose delay has elapsed at `now`.
    pub async fn visible_messages(&self, queue: &str, now: DateTime<Utc>) -> Vec<QueuedMessage> {
        self.messages(queue)
            .await
            .into_iter()
            .filter(|m| m.visible_at <= now)
            .collect()
    }
}

#[async_trait]
impl MessageSender for InMemoryMessageSender {
    async fn send(
        &self,
        message: &TransportMessage,
        delay: Option<Duration>,
    ) -> MessagingResult<()> {
        let body = message.to_json()?;
        let delay = chrono::Duration::from_std(delay.unwrap_or_default())
            .map_err(|e| MessagingError::InvalidMessage(format!("Delay out of range: {}", e)))?;

        let queued = QueuedMessage {
            body,
            visible_at: Utc::now() + delay,
        };

        self.queues
            .lock()
            .await
            .entry(message.name.clone())
            .or_default()
            .push(queued);

        tracing::debug!(queue = %message.name, "In-memory message queued");
        Ok(())
    }

    async fn queue_exists(&self, queue: &str) -> MessagingResult<bool> {
        Ok(self.queues.lock().await.contains_key(queue))
    }

    async fn delete_queue_if_exists(&self, queue: &str) -> MessagingResult<bool> {
        Ok(self.queues.lock().await.remove(queue).is_some())
    }

    async fn approximate_message_count(&self, queue: &str) -> MessagingResult<u64> {
        Ok(self
            .queues
            .lock()
            .await
            .get(queue)
            .map_or(0, |messages| messages.len() as u64))
    }
}
