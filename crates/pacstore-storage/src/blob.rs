//! Object store adapter
//!
//! Backs containers with top-level prefixes of a single bucket (or an
//! in-process [`InMemory`] store). An empty `<container>/.container` marker
//! object makes a freshly created container visible to listings.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use object_store::buffered::BufWriter;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{
    Attribute, AttributeValue, Attributes, GetOptions, ObjectStore, ObjectStoreExt, PutOptions,
    PutPayload,
};
use pacstore_core::StorageBackend;
use tokio::io::AsyncWriteExt;

use crate::content_type::infer_content_type;
use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectProperties, StorageAdapter, UploadPayload};

/// Marker object that materializes an empty container.
const CONTAINER_MARKER: &str = ".container";

/// Storage adapter over any [`ObjectStore`]
#[derive(Clone)]
pub struct ObjectStoreAdapter {
    store: Arc<dyn ObjectStore>,
    backend: StorageBackend,
    /// Root URI such as `s3://bucket` or `memory://`.
    descriptor: String,
}

impl std::fmt::Debug for ObjectStoreAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreAdapter")
            .field("backend", &self.backend)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl ObjectStoreAdapter {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        backend: StorageBackend,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            store,
            backend,
            descriptor: descriptor.into(),
        }
    }

    /// Process-local store. Content is lost when the adapter is dropped.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), StorageBackend::Memory, "memory://")
    }

    /// Create an adapter for an S3 bucket
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    #[cfg(feature = "storage-s3")]
    pub fn s3(bucket: &str, region: &str, endpoint_url: Option<&str>) -> StorageResult<Self> {
        use object_store::aws::AmazonS3Builder;

        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket);

        if let Some(endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder.with_endpoint(endpoint).with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        tracing::info!(
            bucket = %bucket,
            region = %region,
            endpoint = ?endpoint_url,
            "S3 storage adapter initialized"
        );

        Ok(Self::new(
            Arc::new(store),
            StorageBackend::S3,
            format!("s3://{}", bucket),
        ))
    }

    fn object_path(container: &str, name: &str) -> StorageResult<Path> {
        if container.is_empty() || container.contains('/') {
            return Err(StorageError::InvalidArgument(format!(
                "Invalid container name: {:?}",
                container
            )));
        }
        if name.is_empty() || name == CONTAINER_MARKER {
            return Err(StorageError::InvalidArgument(format!(
                "Invalid object name: {:?}",
                name
            )));
        }
        Ok(Path::parse(format!("{}/{}", container, name))?)
    }

    fn container_path(container: &str) -> StorageResult<Path> {
        if container.is_empty() || container.contains('/') {
            return Err(StorageError::InvalidArgument(format!(
                "Invalid container name: {:?}",
                container
            )));
        }
        Ok(Path::parse(container)?)
    }

    fn marker_path(container: &str) -> StorageResult<Path> {
        Ok(Path::parse(format!("{}/{}", container, CONTAINER_MARKER))?)
    }

    fn attributes(content_type: &str, metadata: &HashMap<String, String>) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
        for (key, value) in metadata {
            attributes.insert(
                Attribute::Metadata(key.clone().into()),
                AttributeValue::from(value.clone()),
            );
        }
        attributes
    }

    fn split_attributes(attributes: &Attributes) -> (Option<String>, HashMap<String, String>) {
        let mut content_type = None;
        let mut metadata = HashMap::new();
        for (attribute, value) in attributes.iter() {
            match attribute {
                Attribute::ContentType => {
                    let value: &str = value.as_ref();
                    content_type = Some(value.to_string());
                }
                Attribute::Metadata(key) => {
                    let value: &str = value.as_ref();
                    metadata.insert(key.to_string(), value.to_string());
                }
                _ => {}
            }
        }
        (content_type, metadata)
    }

    async fn put_bytes(
        &self,
        path: &Path,
        data: Bytes,
        attributes: Attributes,
    ) -> StorageResult<u64> {
        let size = data.len() as u64;
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };
        self.store
            .put_opts(path, PutPayload::from(data), opts)
            .await?;
        Ok(size)
    }

    /// Stream a reader into the store through a multipart-capable writer.
    ///
    /// A failed read aborts the upload; the discarded write surfaces as `Cancelled`.
    async fn put_reader<R>(
        &self,
        path: &Path,
        mut reader: R,
        attributes: Attributes,
    ) -> StorageResult<u64>
    where
        R: tokio::io::AsyncRead + Unpin + Send,
    {
        let key = path.to_string();
        let mut writer =
            BufWriter::new(self.store.clone(), path.clone()).with_attributes(attributes);

        let copied = match tokio::io::copy(&mut reader, &mut writer).await {
            Ok(copied) => copied,
            Err(e) => {
                if let Err(abort_err) = writer.abort().await {
                    tracing::warn!(
                        error = %abort_err,
                        key = %key,
                        "Failed to abort partial upload"
                    );
                    return Err(StorageError::from_io(e, &key));
                }
                return Err(StorageError::Cancelled(format!(
                    "{}: upload aborted: {}",
                    key, e
                )));
            }
        };
        writer
            .shutdown()
            .await
            .map_err(|e| StorageError::from_io(e, &key))?;

        Ok(copied)
    }
}

#[async_trait]
impl StorageAdapter for ObjectStoreAdapter {
    fn backend_type(&self) -> StorageBackend {
        self.backend
    }

    fn connection_descriptor(&self) -> String {
        self.descriptor.clone()
    }

    fn container_uri(&self, container: &str) -> String {
        format!("{}/{}", self.descriptor, container)
    }

    fn object_uri(&self, container: &str, name: &str) -> String {
        format!("{}/{}/{}", self.descriptor, container, name)
    }

    async fn create_container_if_absent(&self, container: &str) -> StorageResult<()> {
        let marker = Self::marker_path(container)?;
        match self.store.head(&marker).await {
            Ok(_) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => {
                self.store.put(&marker, PutPayload::from(Bytes::new())).await?;
                tracing::debug!(
                    descriptor = %self.descriptor,
                    container = %container,
                    "Object store container created"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn container_exists(&self, container: &str) -> StorageResult<bool> {
        let prefix = Self::container_path(container)?;
        let first = self.store.list(Some(&prefix)).next().await;
        match first {
            None => Ok(false),
            Some(Ok(_)) => Ok(true),
            Some(Err(e)) => Err(e.into()),
        }
    }

    /// `list_with_delimiter` is not paged by object_store, so the top-level
    /// prefixes are fetched in one request on first poll and then streamed.
    fn list_containers(&self, prefix: Option<String>) -> BoxStream<'_, StorageResult<String>> {
        futures::stream::once(async move {
            let listing = self.store.list_with_delimiter(None).await?;
            let names: Vec<StorageResult<String>> = listing
                .common_prefixes
                .iter()
                .filter_map(|p| p.filename().map(str::to_string))
                .filter(|name| prefix.as_deref().map_or(true, |p| name.starts_with(p)))
                .map(Ok)
                .collect();
            Ok::<_, StorageError>(futures::stream::iter(names))
        })
        .try_flatten()
        .boxed()
    }

    async fn delete_container(&self, container: &str) -> StorageResult<()> {
        let prefix = Self::container_path(container)?;
        let start = std::time::Instant::now();

        let paths: Vec<Path> = self
            .store
            .list(Some(&prefix))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await?;

        for path in &paths {
            match self.store.delete(path).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        descriptor = %self.descriptor,
                        key = %path,
                        "Object store container delete failed"
                    );
                    return Err(e.into());
                }
            }
        }

        tracing::info!(
            descriptor = %self.descriptor,
            container = %container,
            objects = paths.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object store container delete successful"
        );

        Ok(())
    }

    fn list_objects<'a>(
        &'a self,
        container: &'a str,
        prefix: Option<&'a str>,
    ) -> BoxStream<'a, StorageResult<String>> {
        let root = match Self::container_path(container) {
            Ok(root) => root,
            Err(e) => return futures::stream::once(async move { Err(e) }).boxed(),
        };
        let strip = format!("{}/", container);

        self.store
            .list(Some(&root))
            .map_err(StorageError::from)
            .try_filter_map(move |meta| {
                let name = meta
                    .location
                    .as_ref()
                    .strip_prefix(strip.as_str())
                    .map(str::to_string);
                let keep = name.filter(|name| {
                    name != CONTAINER_MARKER && prefix.map_or(true, |p| name.starts_with(p))
                });
                futures::future::ready(Ok(keep))
            })
            .boxed()
    }

    async fn object_exists(&self, container: &str, name: &str) -> StorageResult<bool> {
        let path = Self::object_path(container, name)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn properties(
        &self,
        container: &str,
        name: &str,
    ) -> StorageResult<Option<ObjectProperties>> {
        let path = Self::object_path(container, name)?;
        let options = GetOptions {
            head: true,
            ..Default::default()
        };

        let result = match self.store.get_opts(&path, options).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let (content_type, metadata) = Self::split_attributes(&result.attributes);
        Ok(Some(ObjectProperties {
            size: result.meta.size,
            content_type: content_type.unwrap_or_else(|| infer_content_type(name).to_string()),
            metadata,
        }))
    }

    /// Object stores cannot patch metadata in place, so the content is re-put.
    async fn set_metadata(
        &self,
        container: &str,
        name: &str,
        metadata: HashMap<String, String>,
    ) -> StorageResult<()> {
        let path = Self::object_path(container, name)?;
        let current = self.store.get(&path).await?;
        let (content_type, _) = Self::split_attributes(&current.attributes);
        let content_type = content_type.unwrap_or_else(|| infer_content_type(name).to_string());
        let data = current.bytes().await?;

        self.put_bytes(&path, data, Self::attributes(&content_type, &metadata))
            .await?;

        tracing::debug!(
            descriptor = %self.descriptor,
            key = %path,
            "Object store metadata updated"
        );

        Ok(())
    }

    async fn upload(
        &self,
        container: &str,
        name: &str,
        payload: UploadPayload,
        content_type: &str,
    ) -> StorageResult<u64> {
        let path = Self::object_path(container, name)?;
        let attributes = Self::attributes(content_type, &HashMap::new());
        let start = std::time::Instant::now();

        let result = match payload {
            UploadPayload::Bytes(data) => self.put_bytes(&path, data, attributes).await,
            UploadPayload::Reader(reader) => self.put_reader(&path, reader, attributes).await,
            UploadPayload::File(source) => match tokio::fs::File::open(&source).await {
                Ok(file) => self.put_reader(&path, file, attributes).await,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(StorageError::SourceFileNotFound(source))
                }
                Err(e) => Err(StorageError::from_io(e, &source.display().to_string())),
            },
        };

        let size = result.map_err(|e| {
            tracing::error!(
                error = %e,
                descriptor = %self.descriptor,
                key = %path,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Object store upload failed"
            );
            e
        })?;

        tracing::info!(
            descriptor = %self.descriptor,
            key = %path,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object store upload successful"
        );

        Ok(size)
    }

    async fn download(&self, container: &str, name: &str) -> StorageResult<ByteStream> {
        let path = Self::object_path(container, name)?;
        let result = self.store.get(&path).await?;

        let key = path.to_string();
        let stream = result.into_stream().map(move |chunk| {
            chunk.map_err(|e| {
                tracing::error!(error = %e, key = %key, "Object store stream download error");
                StorageError::from(e)
            })
        });

        Ok(Box::pin(stream))
    }

    async fn delete_object(&self, container: &str, name: &str) -> StorageResult<()> {
        let path = Self::object_path(container, name)?;
        let start = std::time::Instant::now();

        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    descriptor = %self.descriptor,
                    key = %path,
                    "Object store delete failed"
                );
                return Err(e.into());
            }
        }

        tracing::info!(
            descriptor = %self.descriptor,
            key = %path,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object store delete successful"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn adapter() -> ObjectStoreAdapter {
        let adapter = ObjectStoreAdapter::in_memory();
        adapter.create_container_if_absent("study").await.unwrap();
        adapter
    }

    async fn collect(stream: ByteStream) -> Vec<u8> {
        stream.map(|chunk| chunk.unwrap().to_vec()).concat().await
    }

    #[tokio::test]
    async fn upload_records_content_type_and_size() {
        let adapter = adapter().await;
        let written = adapter
            .upload(
                "study",
                "series/sop.dcm",
                UploadPayload::from(b"0123456789".to_vec()),
                "application/dicom",
            )
            .await
            .unwrap();
        assert_eq!(written, 10);

        let props = adapter
            .properties("study", "series/sop.dcm")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(props.size, 10);
        assert_eq!(props.content_type, "application/dicom");

        let stream = adapter.download("study", "series/sop.dcm").await.unwrap();
        assert_eq!(collect(stream).await, b"0123456789");
    }

    #[tokio::test]
    async fn reader_upload_streams_content() {
        let adapter = adapter().await;
        let data = vec![7u8; 64 * 1024];
        let reader = Box::pin(std::io::Cursor::new(data.clone()));

        let written = adapter
            .upload("study", "big.bin", UploadPayload::Reader(reader), "application/octet-stream")
            .await
            .unwrap();
        assert_eq!(written, data.len() as u64);

        let stream = adapter.download("study", "big.bin").await.unwrap();
        assert_eq!(collect(stream).await, data);
    }

    #[tokio::test]
    async fn set_metadata_keeps_content_and_type() {
        let adapter = adapter().await;
        adapter
            .upload("study", "a.json", UploadPayload::from(b"{}".to_vec()), "application/json")
            .await
            .unwrap();

        let mut metadata = HashMap::new();
        metadata.insert("meta".to_string(), "reviewed".to_string());
        adapter.set_metadata("study", "a.json", metadata).await.unwrap();

        let props = adapter.properties("study", "a.json").await.unwrap().unwrap();
        assert_eq!(props.content_type, "application/json");
        assert_eq!(props.metadata.get("meta").map(String::as_str), Some("reviewed"));
        assert_eq!(props.size, 2);
    }

    #[tokio::test]
    async fn missing_objects() {
        let adapter = adapter().await;
        assert!(!adapter.object_exists("study", "nope").await.unwrap());
        assert!(adapter.properties("study", "nope").await.unwrap().is_none());
        assert!(adapter.delete_object("study", "nope").await.is_ok());
        assert!(matches!(
            adapter.download("study", "nope").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            adapter.set_metadata("study", "nope", HashMap::new()).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn containers_are_prefixes_with_marker() {
        let adapter = adapter().await;
        adapter.create_container_if_absent("series").await.unwrap();
        adapter.create_container_if_absent("series").await.unwrap();
        assert!(adapter.container_exists("series").await.unwrap());
        assert!(!adapter.container_exists("other").await.unwrap());

        let mut names: Vec<String> = adapter
            .list_containers(None)
            .map(|r| r.unwrap())
            .collect()
            .await;
        names.sort();
        assert_eq!(names, vec!["series", "study"]);

        let names: Vec<String> = adapter
            .list_containers(Some("stu".to_string()))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(names, vec!["study"]);

        let objects: Vec<String> = adapter
            .list_objects("series", None)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert!(objects.is_empty());

        adapter.delete_container("series").await.unwrap();
        assert!(!adapter.container_exists("series").await.unwrap());
    }

    #[tokio::test]
    async fn list_objects_filters_by_prefix() {
        let adapter = adapter().await;
        for name in ["s1/a.dcm", "s1/b.dcm", "s2/c.dcm"] {
            adapter
                .upload("study", name, UploadPayload::from(b"x".to_vec()), "application/dicom")
                .await
                .unwrap();
        }

        let mut names: Vec<String> = adapter
            .list_objects("study", Some("s1/"))
            .map(|r| r.unwrap())
            .collect()
            .await;
        names.sort();
        assert_eq!(names, vec!["s1/a.dcm", "s1/b.dcm"]);
    }

    #[test]
    fn uris_are_rooted_at_descriptor() {
        let adapter = ObjectStoreAdapter::in_memory();
        assert_eq!(adapter.connection_descriptor(), "memory://");
        assert_eq!(adapter.container_uri("abc"), "memory:///abc");
        assert_eq!(adapter.object_uri("abc", "x/y.dcm"), "memory:///abc/x/y.dcm");
    }

    #[test]
    fn marker_name_is_reserved() {
        assert!(matches!(
            ObjectStoreAdapter::object_path("abc", CONTAINER_MARKER),
            Err(StorageError::InvalidArgument(_))
        ));
        assert!(matches!(
            ObjectStoreAdapter::object_path("abc", "a/../b"),
            Err(StorageError::InvalidArgument(_))
        ));
    }
}
