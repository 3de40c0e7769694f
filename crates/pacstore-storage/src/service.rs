//! Top-level storage entry point.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use pacstore_core::{MediaId, StorageBackend};

use crate::container::Container;
use crate::error::{StorageError, StorageResult};
use crate::keys::{KeyProvider, StorageKey};
use crate::location::Location;
use crate::naming::{normalize_container_name, normalize_container_prefix};
use crate::traits::{StorageAdapter, UploadPayload};

/// Resolves media identifiers to locations on one backend.
///
/// The backend is fixed at construction; nothing here branches on which
/// backend is in use.
#[derive(Clone)]
pub struct StorageService {
    adapter: Arc<dyn StorageAdapter>,
    keys: KeyProvider,
}

impl std::fmt::Debug for StorageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageService")
            .field("backend", &self.adapter.backend_type())
            .field("connection", &self.adapter.connection_descriptor())
            .finish()
    }
}

impl StorageService {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            keys: KeyProvider::new(),
        }
    }

    pub fn key_provider(&self) -> &KeyProvider {
        &self.keys
    }

    pub fn backend_type(&self) -> StorageBackend {
        self.adapter.backend_type()
    }

    pub fn connection_descriptor(&self) -> String {
        self.adapter.connection_descriptor()
    }

    pub fn derive_key(&self, media_id: &dyn MediaId) -> StorageKey {
        self.keys.derive_key(media_id)
    }

    /// Resolve an identifier to its location, creating the container if needed.
    pub async fn resolve(&self, media_id: Arc<dyn MediaId>) -> StorageResult<Location> {
        let key = self.keys.derive_key(media_id.as_ref());
        self.resolve_parts(key.as_str(), Some(media_id)).await
    }

    /// Resolve an already derived key, creating the container if needed.
    pub async fn resolve_key(&self, key: &str) -> StorageResult<Location> {
        self.resolve_parts(key, None).await
    }

    async fn resolve_parts(
        &self,
        key: &str,
        media_id: Option<Arc<dyn MediaId>>,
    ) -> StorageResult<Location> {
        let container_name = self.keys.container_name(key);
        let location_name = self.keys.location_name(key);
        if container_name.is_empty() || location_name.is_empty() {
            return Err(StorageError::InvalidArgument(format!(
                "Storage key {:?} has no container or location part",
                key
            )));
        }

        tracing::debug!(
            key = %key,
            container = %container_name,
            location = %location_name,
            "Resolving storage key"
        );

        let container = self.container(&container_name).await?;
        container.location(&location_name, media_id)
    }

    /// Obtain the container for `key`, creating it if absent.
    pub async fn container(&self, key: &str) -> StorageResult<Container> {
        let name = normalize_container_name(key);
        if name.is_empty() {
            return Err(StorageError::InvalidArgument(
                "Container key cannot be empty".to_string(),
            ));
        }
        self.adapter.create_container_if_absent(&name).await?;
        Ok(Container::new(self.adapter.clone(), name))
    }

    pub async fn container_exists(&self, key: &str) -> StorageResult<bool> {
        let name = normalize_container_name(key);
        if name.is_empty() {
            return Ok(false);
        }
        self.adapter.container_exists(&name).await
    }

    /// Containers whose name starts with the normalized `prefix`.
    pub fn containers(&self, prefix: Option<&str>) -> BoxStream<'_, StorageResult<Container>> {
        let prefix = prefix
            .map(normalize_container_prefix)
            .filter(|p| !p.is_empty());
        self.adapter
            .list_containers(prefix)
            .map(move |name| name.map(|name| Container::new(self.adapter.clone(), name)))
            .boxed()
    }

    /// Delete the container for `key` and everything in it.
    pub async fn delete_container(&self, key: &str) -> StorageResult<()> {
        let name = normalize_container_name(key);
        if name.is_empty() {
            return Err(StorageError::InvalidArgument(
                "Container key cannot be empty".to_string(),
            ));
        }
        self.adapter.delete_container(&name).await
    }

    /// Resolve `media_id` and upload `payload` to it.
    pub async fn write(
        &self,
        media_id: Arc<dyn MediaId>,
        payload: impl Into<UploadPayload>,
        content_type: Option<&str>,
    ) -> StorageResult<Location> {
        let mut location = self.resolve(media_id).await?;
        location.upload(payload, content_type).await?;
        Ok(location)
    }

    /// Resolve `media_id` and read its content.
    pub async fn read(&self, media_id: Arc<dyn MediaId>) -> StorageResult<Bytes> {
        self.resolve(media_id).await?.download_bytes().await
    }

    pub async fn exists(&self, media_id: Arc<dyn MediaId>) -> StorageResult<bool> {
        self.resolve(media_id).await?.exists().await
    }

    pub async fn delete(&self, media_id: Arc<dyn MediaId>) -> StorageResult<()> {
        self.resolve(media_id).await?.delete().await
    }
}
