use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sqs::operation::get_queue_url::GetQueueUrlError;
use aws_sdk_sqs::types::QueueAttributeName;
use aws_sdk_sqs::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{MessagingError, MessagingResult};
use crate::message::{validate_queue_name, TransportMessage};
use crate::traits::MessageSender;

/// Longest delivery delay SQS accepts.
pub const MAX_DELAY: Duration = Duration::from_secs(900);

const PERMISSION_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "InvalidClientTokenId",
    "UnrecognizedClientException",
    "SignatureDoesNotMatch",
];

const MISSING_QUEUE_CODES: &[&str] = &[
    "AWS.SimpleQueueService.NonExistentQueue",
    "QueueDoesNotExist",
];

/// Amazon SQS message sender
pub struct SqsMessageSender {
    client: Client,
    /// Queue name to queue URL.
    queue_urls: RwLock<HashMap<String, String>>,
}

impl std::fmt::Debug for SqsMessageSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqsMessageSender").finish_non_exhaustive()
    }
}

impl SqsMessageSender {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            queue_urls: RwLock::new(HashMap::new()),
        }
    }

    /// Build a client from the default AWS credential chain.
    ///
    /// # Arguments
    /// * `region` - AWS region; the SDK's own resolution applies when `None`
    /// * `endpoint_url` - Optional endpoint for SQS-compatible services (e.g. LocalStack)
    pub async fn from_env(region: Option<&str>, endpoint_url: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        if let Some(endpoint) = endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;

        tracing::info!(
            region = ?region,
            endpoint = ?endpoint_url,
            "SQS message sender initialized"
        );
        Self::new(Client::new(&config))
    }

    /// URL of an existing queue, `None` if it does not exist.
    async fn lookup_queue_url(&self, queue: &str) -> MessagingResult<Option<String>> {
        if let Some(url) = self.queue_urls.read().await.get(queue) {
            return Ok(Some(url.clone()));
        }

        let result = self.client.get_queue_url().queue_name(queue).send().await;
        let url = match result {
            Ok(output) => output.queue_url().map(str::to_string),
            Err(SdkError::ServiceError(ref service_err))
                if matches!(service_err.err(), GetQueueUrlError::QueueDoesNotExist(_)) =>
            {
                None
            }
            Err(e) => return Err(map_sdk_error(e, queue)),
        };

        if let Some(url) = &url {
            self.queue_urls
                .write()
                .await
                .insert(queue.to_string(), url.clone());
        }
        Ok(url)
    }

    async fn ensure_queue(&self, queue: &str) -> MessagingResult<String> {
        if let Some(url) = self.lookup_queue_url(queue).await? {
            return Ok(url);
        }

        let output = self
            .client
            .create_queue()
            .queue_name(queue)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, queue))?;

        let url = output
            .queue_url()
            .map(str::to_string)
            .ok_or_else(|| {
                MessagingError::Transport(format!("No URL returned for queue {}", queue))
            })?;

        tracing::info!(queue = %queue, "SQS queue created");
        self.queue_urls
            .write()
            .await
            .insert(queue.to_string(), url.clone());
        Ok(url)
    }
}

/// Translate an SDK failure into the messaging taxonomy.
fn map_sdk_error<E, R>(err: SdkError<E, R>, queue: &str) -> MessagingError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let code = err.code().map(str::to_string);
    let detail = DisplayErrorContext(&err).to_string();

    match code.as_deref() {
        Some(code) if MISSING_QUEUE_CODES.contains(&code) => {
            MessagingError::QueueNotFound(queue.to_string())
        }
        Some(code) if PERMISSION_CODES.contains(&code) => {
            MessagingError::PermissionDenied(format!("{}: {}", queue, detail))
        }
        _ => MessagingError::Transport(format!("{}: {}", queue, detail)),
    }
}

/// SQS delay in whole seconds, clamped to [`MAX_DELAY`].
fn delay_seconds(delay: Option<Duration>) -> i32 {
    let seconds = delay.unwrap_or_default().min(MAX_DELAY).as_secs();
    i32::try_from(seconds).unwrap_or(i32::MAX)
}

#[async_trait]
impl MessageSender for SqsMessageSender {
    async fn send(
        &self,
        message: &TransportMessage,
        delay: Option<Duration>,
    ) -> MessagingResult<()> {
        let body = message.to_json()?;
        let queue = message.name.as_str();
        let start = std::time::Instant::now();

        let url = self.ensure_queue(queue).await?;
        let delay_secs = delay_seconds(delay);

        self.client
            .send_message()
            .queue_url(&url)
            .message_body(body)
            .delay_seconds(delay_secs)
            .send()
            .await
            .map_err(|e| {
                let err = map_sdk_error(e, queue);
                tracing::error!(
                    error = %err,
                    queue = %queue,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "SQS send failed"
                );
                err
            })?;

        tracing::info!(
            queue = %queue,
            delay_secs = delay_secs,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "SQS send successful"
        );

        Ok(())
    }

    async fn queue_exists(&self, queue: &str) -> MessagingResult<bool> {
        validate_queue_name(queue)?;
        Ok(self.lookup_queue_url(queue).await?.is_some())
    }

    async fn delete_queue_if_exists(&self, queue: &str) -> MessagingResult<bool> {
        validate_queue_name(queue)?;
        let Some(url) = self.lookup_queue_url(queue).await? else {
            return Ok(false);
        };

        match self.client.delete_queue().queue_url(&url).send().await {
            Ok(_) => {}
            Err(e) => match map_sdk_error(e, queue) {
                MessagingError::QueueNotFound(_) => {}
                other => return Err(other),
            },
        }
        self.queue_urls.write().await.remove(queue);

        tracing::info!(queue = %queue, "SQS queue deleted");
        Ok(true)
    }

    async fn approximate_message_count(&self, queue: &str) -> MessagingResult<u64> {
        validate_queue_name(queue)?;
        let Some(url) = self.lookup_queue_url(queue).await? else {
            return Ok(0);
        };

        let output = self
            .client
            .get_queue_attributes()
            .queue_url(&url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, queue))?;

        let count = output
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::ApproximateNumberOfMessages))
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);
        Ok(count)
    }
}
