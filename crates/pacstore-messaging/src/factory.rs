use crate::{InMemoryMessageSender, MessageSender, MessagingResult};
use pacstore_core::{Config, StorageConnection};
use std::sync::Arc;

/// Create the notification sender for the configured environment
///
/// Returns `None` when no notification queue is configured. The in-process
/// storage backend pairs with the in-process sender.
pub async fn create_message_sender(
    config: &Config,
) -> MessagingResult<Option<Arc<dyn MessageSender>>> {
    let Some(queue) = config.notification_queue() else {
        return Ok(None);
    };
    crate::validate_queue_name(queue)?;

    match config.storage_connection {
        StorageConnection::Memory => Ok(Some(Arc::new(InMemoryMessageSender::new()))),

        #[cfg(feature = "messaging-sqs")]
        _ => {
            let region = config.aws_region.as_deref().or(config.s3_region());
            let sender = crate::SqsMessageSender::from_env(region, None).await;
            Ok(Some(Arc::new(sender)))
        }

        #[cfg(not(feature = "messaging-sqs"))]
        _ => Err(crate::MessagingError::Transport(
            "SQS messaging not available (messaging-sqs feature not enabled)".to_string(),
        )),
    }
}
