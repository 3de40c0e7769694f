//! Backend adapter capability set
//!
//! This module defines the [`StorageAdapter`] trait that every storage backend
//! implements. [`Container`](crate::Container) and [`Location`](crate::Location)
//! only ever talk to a backend through this trait, so no backend type or
//! backend error leaks past it.
//!
//! Container names handed to an adapter are already normalized; object names
//! use `/` as separator.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use pacstore_core::StorageBackend;
use tokio::io::AsyncRead;

use crate::error::StorageResult;

/// Key of the metadata entry that holds a location's free-form metadata string.
pub const META_KEY: &str = "meta";

/// Stream of object content chunks.
pub type ByteStream = BoxStream<'static, StorageResult<Bytes>>;

/// Properties of a stored object as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectProperties {
    pub size: u64,
    pub content_type: String,
    pub metadata: HashMap<String, String>,
}

/// Source of bytes for an upload.
pub enum UploadPayload {
    Bytes(Bytes),
    Reader(Pin<Box<dyn AsyncRead + Send + Unpin>>),
    File(PathBuf),
}

impl std::fmt::Debug for UploadPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadPayload::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            UploadPayload::Reader(_) => write!(f, "Reader"),
            UploadPayload::File(path) => write!(f, "File({})", path.display()),
        }
    }
}

impl From<Bytes> for UploadPayload {
    fn from(bytes: Bytes) -> Self {
        UploadPayload::Bytes(bytes)
    }
}

impl From<Vec<u8>> for UploadPayload {
    fn from(data: Vec<u8>) -> Self {
        UploadPayload::Bytes(Bytes::from(data))
    }
}

impl From<&'static [u8]> for UploadPayload {
    fn from(data: &'static [u8]) -> Self {
        UploadPayload::Bytes(Bytes::from_static(data))
    }
}

impl From<PathBuf> for UploadPayload {
    fn from(path: PathBuf) -> Self {
        UploadPayload::File(path)
    }
}

/// Storage backend adapter
///
/// All storage backends (filesystem, object stores) implement this trait.
/// Implementations translate their transport errors into
/// [`StorageError`](crate::StorageError) and never report a missing object as
/// an error from `object_exists` or `properties`.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Addressable root of the backend, for diagnostics.
    fn connection_descriptor(&self) -> String;

    /// Addressable URI of a container.
    fn container_uri(&self, container: &str) -> String;

    /// Addressable URI of an object.
    fn object_uri(&self, container: &str, name: &str) -> String;

    /// Create the container unless it already exists.
    async fn create_container_if_absent(&self, container: &str) -> StorageResult<()>;

    async fn container_exists(&self, container: &str) -> StorageResult<bool>;

    /// Names of containers starting with `prefix`.
    fn list_containers(&self, prefix: Option<String>) -> BoxStream<'_, StorageResult<String>>;

    /// Delete the container and everything in it. Absent containers are not an error.
    async fn delete_container(&self, container: &str) -> StorageResult<()>;

    /// Names of objects in `container` starting with `prefix`.
    fn list_objects<'a>(
        &'a self,
        container: &'a str,
        prefix: Option<&'a str>,
    ) -> BoxStream<'a, StorageResult<String>>;

    async fn object_exists(&self, container: &str, name: &str) -> StorageResult<bool>;

    /// Properties of an object, `None` if it does not exist.
    async fn properties(&self, container: &str, name: &str)
        -> StorageResult<Option<ObjectProperties>>;

    /// Replace the metadata map of an existing object.
    async fn set_metadata(
        &self,
        container: &str,
        name: &str,
        metadata: HashMap<String, String>,
    ) -> StorageResult<()>;

    /// Write an object, replacing any previous content. Returns the number of bytes written.
    async fn upload(
        &self,
        container: &str,
        name: &str,
        payload: UploadPayload,
        content_type: &str,
    ) -> StorageResult<u64>;

    /// Read an object. Fails with `NotFound` if it does not exist.
    async fn download(&self, container: &str, name: &str) -> StorageResult<ByteStream>;

    /// Delete an object. Absent objects are not an error.
    async fn delete_object(&self, container: &str, name: &str) -> StorageResult<()>;
}
