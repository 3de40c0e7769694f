use async_trait::async_trait;
use std::time::Duration;

use crate::error::MessagingResult;
use crate::message::TransportMessage;

/// Queue transport for notifications
///
/// `message.name` is the destination queue. Implementations create the queue
/// if it does not exist yet.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send a message, hidden from consumers for `delay` if given.
    async fn send(
        &self,
        message: &TransportMessage,
        delay: Option<Duration>,
    ) -> MessagingResult<()>;

    async fn queue_exists(&self, queue: &str) -> MessagingResult<bool>;

    /// Returns whether a queue was deleted.
    async fn delete_queue_if_exists(&self, queue: &str) -> MessagingResult<bool>;

    /// Approximate number of messages waiting in the queue. Zero for a missing queue.
    async fn approximate_message_count(&self, queue: &str) -> MessagingResult<u64>;
}
