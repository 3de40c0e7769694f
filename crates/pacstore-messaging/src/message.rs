//! Message envelope and payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MessagingError, MessagingResult};

/// Longest queue name accepted by the supported transports.
pub const MAX_QUEUE_NAME_LEN: usize = 80;

/// Queue names are 1 to 80 characters of `[A-Za-z0-9_-]`.
pub fn validate_queue_name(name: &str) -> MessagingResult<()> {
    if name.is_empty() || name.len() > MAX_QUEUE_NAME_LEN {
        return Err(MessagingError::InvalidMessage(format!(
            "Queue name must be 1 to {} characters, got {}",
            MAX_QUEUE_NAME_LEN,
            name.len()
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(MessagingError::InvalidMessage(format!(
            "Queue name contains invalid characters: {}",
            name
        )));
    }
    Ok(())
}

/// Envelope sent over a queue. `name` selects the destination queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportMessage {
    pub name: String,
    pub payload: serde_json::Value,
}

impl TransportMessage {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Build a message from any serializable payload.
    pub fn from_payload<T: Serialize>(
        name: impl Into<String>,
        payload: &T,
    ) -> MessagingResult<Self> {
        Ok(Self::new(name, serde_json::to_value(payload)?))
    }

    /// Wire form of the whole envelope.
    pub fn to_json(&self) -> MessagingResult<String> {
        validate_queue_name(&self.name)?;
        Ok(serde_json::to_string(self)?)
    }
}

/// Published after a media object has been written and is readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredInstance {
    pub event_id: Uuid,
    pub key: String,
    pub uri: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub stored_at: DateTime<Utc>,
}

impl StoredInstance {
    pub fn new(
        key: impl Into<String>,
        uri: impl Into<String>,
        size_bytes: u64,
        content_type: Option<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            key: key.into(),
            uri: uri.into(),
            size_bytes,
            content_type,
            stored_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_serializes_name_and_payload() {
        let message = TransportMessage::new("stored-instances", json!({"key": "a/b/c"}));
        let wire: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(wire["name"], "stored-instances");
        assert_eq!(wire["payload"]["key"], "a/b/c");
    }

    #[test]
    fn stored_instance_payload() {
        let event = StoredInstance::new(
            "a/b/c",
            "memory:///a00/c",
            10,
            Some("application/dicom".into()),
        );
        let message = TransportMessage::from_payload("stored", &event).unwrap();
        assert_eq!(message.payload["size_bytes"], 10);
        assert_eq!(message.payload["uri"], "memory:///a00/c");

        let back: StoredInstance = serde_json::from_value(message.payload).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn queue_names_are_validated() {
        assert!(validate_queue_name("pacs-stored_1").is_ok());
        assert!(matches!(
            validate_queue_name(""),
            Err(MessagingError::InvalidMessage(_))
        ));
        assert!(validate_queue_name("bad name").is_err());
        assert!(validate_queue_name(&"q".repeat(81)).is_err());

        let message = TransportMessage::new("has/slash", json!(null));
        assert!(message.to_json().is_err());
    }
}
