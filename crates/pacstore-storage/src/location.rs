//! A single addressable object inside a container.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use pacstore_core::MediaId;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::content_type::infer_content_type;
use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectProperties, StorageAdapter, UploadPayload, META_KEY};

/// Handle to one object: payload, content type and a single metadata string.
///
/// Properties are fetched lazily and cached on this handle. Every mutation
/// made through the handle drops the cache. The cache is never shared, so a
/// handle does not observe writes made through another handle; re-resolve the
/// location when read-after-write across handles matters.
pub struct Location {
    adapter: Arc<dyn StorageAdapter>,
    container: String,
    key: String,
    media_id: Option<Arc<dyn MediaId>>,
    properties: Option<ObjectProperties>,
    size: Option<u64>,
}

impl std::fmt::Debug for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Location")
            .field("container", &self.container)
            .field("key", &self.key)
            .field("media_id", &self.media_id)
            .finish_non_exhaustive()
    }
}

impl Location {
    pub(crate) fn new(
        adapter: Arc<dyn StorageAdapter>,
        container: impl Into<String>,
        key: impl Into<String>,
        media_id: Option<Arc<dyn MediaId>>,
    ) -> Self {
        Self {
            adapter,
            container: container.into(),
            key: key.into(),
            media_id,
            properties: None,
            size: None,
        }
    }

    /// Last path segment of the object name.
    pub fn name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Full object name inside the container.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn container_name(&self) -> &str {
        &self.container
    }

    /// Backend-addressable URI of the object.
    pub fn id(&self) -> String {
        self.adapter.object_uri(&self.container, &self.key)
    }

    /// Identifier this location was resolved from, if any.
    pub fn media_id(&self) -> Option<&Arc<dyn MediaId>> {
        self.media_id.as_ref()
    }

    pub async fn exists(&self) -> StorageResult<bool> {
        self.adapter.object_exists(&self.container, &self.key).await
    }

    /// Size in bytes; 0 when the object does not exist.
    pub async fn size(&mut self) -> StorageResult<u64> {
        if let Some(size) = self.size {
            return Ok(size);
        }

        let size = self.ensure_properties().await?.map(|p| p.size);
        self.size = size;
        Ok(size.unwrap_or(0))
    }

    /// Stored content type; `None` when the object does not exist.
    pub async fn content_type(&mut self) -> StorageResult<Option<String>> {
        Ok(self
            .ensure_properties()
            .await?
            .map(|p| p.content_type.clone()))
    }

    /// Free-form metadata string; `None` when unset or the object does not exist.
    pub async fn metadata(&mut self) -> StorageResult<Option<String>> {
        Ok(self
            .ensure_properties()
            .await?
            .and_then(|p| p.metadata.get(META_KEY).cloned()))
    }

    /// Set or clear the metadata string.
    ///
    /// Does nothing when the object does not exist. `None` or an empty value
    /// removes the entry.
    pub async fn set_metadata(&mut self, value: Option<&str>) -> StorageResult<()> {
        let Some(properties) = self.adapter.properties(&self.container, &self.key).await? else {
            tracing::debug!(
                container = %self.container,
                key = %self.key,
                "Skipping metadata update for missing object"
            );
            return Ok(());
        };

        let mut metadata = properties.metadata;
        match value.filter(|v| !v.is_empty()) {
            Some(value) => {
                metadata.insert(META_KEY.to_string(), value.to_string());
            }
            None => {
                metadata.remove(META_KEY);
            }
        }

        let result = self
            .adapter
            .set_metadata(&self.container, &self.key, metadata)
            .await;
        self.invalidate();
        result
    }

    /// Write the object.
    ///
    /// Without an explicit `content_type` the type is inferred from the
    /// location name's extension.
    pub async fn upload(
        &mut self,
        payload: impl Into<UploadPayload>,
        content_type: Option<&str>,
    ) -> StorageResult<u64> {
        let payload = payload.into();

        if let UploadPayload::File(path) = &payload {
            if path.as_os_str().is_empty() {
                return Err(StorageError::InvalidArgument(
                    "Upload source path is empty".to_string(),
                ));
            }
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(StorageError::SourceFileNotFound(path.clone()));
            }
        }

        let content_type = content_type
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| infer_content_type(&self.key))
            .to_string();

        let written = self
            .adapter
            .upload(&self.container, &self.key, payload, &content_type)
            .await?;
        self.invalidate();
        Ok(written)
    }

    /// Stream the object's content. Fails with `NotFound` if it does not exist.
    pub async fn download(&self) -> StorageResult<ByteStream> {
        self.adapter.download(&self.container, &self.key).await
    }

    /// Same as [`Location::download`].
    pub async fn read_stream(&self) -> StorageResult<ByteStream> {
        self.download().await
    }

    /// Read the whole object into memory.
    pub async fn download_bytes(&self) -> StorageResult<Bytes> {
        let mut stream = self.download().await?;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Copy the object's content into `destination`. Returns the bytes copied.
    pub async fn download_to<W>(&self, destination: &mut W) -> StorageResult<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut stream = self.download().await?;
        let mut copied = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            destination
                .write_all(&chunk)
                .await
                .map_err(|e| StorageError::from_io(e, "download destination"))?;
            copied += chunk.len() as u64;
        }
        destination
            .flush()
            .await
            .map_err(|e| StorageError::from_io(e, "download destination"))?;
        Ok(copied)
    }

    /// Delete the object. Deleting a missing object succeeds.
    pub async fn delete(&mut self) -> StorageResult<()> {
        let result = self.adapter.delete_object(&self.container, &self.key).await;
        self.invalidate();
        result
    }

    fn invalidate(&mut self) {
        self.properties = None;
        self.size = None;
    }

    async fn ensure_properties(&mut self) -> StorageResult<Option<&ObjectProperties>> {
        if self.properties.is_none() {
            tracing::debug!(
                container = %self.container,
                key = %self.key,
                "Fetching object properties"
            );
            self.properties = self.adapter.properties(&self.container, &self.key).await?;
        }
        Ok(self.properties.as_ref())
    }
}
