//! Pacstore Messaging Library
//!
//! Publishes notifications about stored media to a named queue. The storage
//! crate never calls into this one; callers publish only after an upload has
//! completed so that readers woken by a message can see the object.

pub mod error;
pub mod factory;
pub mod memory;
pub mod message;
#[cfg(feature = "messaging-sqs")]
pub mod sqs;
pub mod traits;

// Re-export commonly used types
pub use error::{MessagingError, MessagingResult};
pub use factory::create_message_sender;
pub use memory::{InMemoryMessageSender, QueuedMessage};
pub use message::{validate_queue_name, StoredInstance, TransportMessage, MAX_QUEUE_NAME_LEN};
#[cfg(feature = "messaging-sqs")]
pub use sqs::SqsMessageSender;
pub use traits::MessageSender;
