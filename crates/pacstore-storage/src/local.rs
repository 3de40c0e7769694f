use crate::content_type::infer_content_type;
use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectProperties, StorageAdapter, UploadPayload};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use pacstore_core::StorageBackend;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Per-container directory holding property sidecars.
const PROPS_DIR: &str = ".props";

/// Content type and metadata persisted next to each object.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredProperties {
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Local filesystem storage adapter
///
/// Containers are directories under the root; objects are files inside them.
/// Content type and metadata live in `<container>/.props/<name>.json`.
#[derive(Clone, Debug)]
pub struct LocalAdapter {
    base_path: PathBuf,
}

impl LocalAdapter {
    /// Create a new LocalAdapter instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/pacstore")
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::Config(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalAdapter { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn container_path(&self, container: &str) -> StorageResult<PathBuf> {
        if container.is_empty()
            || container.starts_with('.')
            || container.contains(['/', '\\'])
        {
            return Err(StorageError::InvalidArgument(format!(
                "Invalid container name: {:?}",
                container
            )));
        }
        Ok(self.base_path.join(container))
    }

    /// Convert an object name to a filesystem path with traversal checks.
    fn object_path(&self, container: &str, name: &str) -> StorageResult<PathBuf> {
        validate_object_name(name)?;
        let mut path = self.container_path(container)?;
        for segment in name.split('/') {
            path.push(segment);
        }
        Ok(path)
    }

    fn props_path(&self, container: &str, name: &str) -> StorageResult<PathBuf> {
        validate_object_name(name)?;
        let mut path = self.container_path(container)?.join(PROPS_DIR);
        for segment in name.split('/') {
            path.push(segment);
        }
        let file_name = format!(
            "{}.json",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        path.set_file_name(file_name);
        Ok(path)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::from_io(e, &parent.display().to_string()))?;
        }
        Ok(())
    }

    async fn is_file(path: &Path) -> StorageResult<bool> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::from_io(e, &path.display().to_string())),
        }
    }

    async fn read_props(path: &Path) -> StorageResult<StoredProperties> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StorageError::BackendUnavailable(format!(
                    "Corrupt properties file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StoredProperties::default()),
            Err(e) => Err(StorageError::from_io(e, &path.display().to_string())),
        }
    }

    async fn write_props(&self, path: &Path, props: &StoredProperties) -> StorageResult<()> {
        self.ensure_parent_dir(path).await?;
        let bytes = serde_json::to_vec(props).map_err(|e| {
            StorageError::BackendUnavailable(format!("Failed to encode properties: {}", e))
        })?;
        fs::write(path, bytes)
            .await
            .map_err(|e| StorageError::from_io(e, &path.display().to_string()))
    }

    async fn write_object(
        &self,
        path: &Path,
        key: &str,
        payload: UploadPayload,
    ) -> StorageResult<u64> {
        match payload {
            UploadPayload::File(source) => fs::copy(&source, path)
                .await
                .map_err(|e| StorageError::from_io(e, key)),
            UploadPayload::Bytes(data) => {
                let write = async {
                    let mut file = fs::File::create(path).await?;
                    file.write_all(&data).await?;
                    file.sync_all().await
                };
                write.await.map_err(|e| StorageError::from_io(e, key))?;
                Ok(data.len() as u64)
            }
            UploadPayload::Reader(mut reader) => {
                let mut file = fs::File::create(path)
                    .await
                    .map_err(|e| StorageError::from_io(e, key))?;
                match tokio::io::copy(&mut reader, &mut file).await {
                    Ok(copied) => {
                        file.sync_all()
                            .await
                            .map_err(|e| StorageError::from_io(e, key))?;
                        Ok(copied)
                    }
                    Err(e) => {
                        drop(file);
                        if let Err(remove_err) = fs::remove_file(path).await {
                            tracing::warn!(
                                error = %remove_err,
                                path = %path.display(),
                                "Failed to remove partial upload"
                            );
                            return Err(StorageError::from_io(e, key));
                        }
                        Err(StorageError::Cancelled(format!(
                            "{}: upload aborted: {}",
                            key, e
                        )))
                    }
                }
            }
        }
    }
}

/// Reject names that could escape the container directory.
fn validate_object_name(name: &str) -> StorageResult<()> {
    if name.is_empty() || name.starts_with('/') || name.contains('\\') {
        return Err(StorageError::InvalidArgument(format!(
            "Invalid object name: {:?}",
            name
        )));
    }
    for (index, segment) in name.split('/').enumerate() {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(StorageError::InvalidArgument(format!(
                "Object name contains invalid segment: {:?}",
                name
            )));
        }
        if index == 0 && segment == PROPS_DIR {
            return Err(StorageError::InvalidArgument(format!(
                "Object name uses reserved prefix: {:?}",
                name
            )));
        }
    }
    Ok(())
}

/// Remove empty directories from `dir` upwards, stopping before `stop`.
async fn prune_empty_dirs(dir: &Path, stop: &Path) {
    let mut current = Some(dir);
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }
        // Fails on non-empty directories, which ends the walk.
        if fs::remove_dir(dir).await.is_err() {
            break;
        }
        current = dir.parent();
    }
}

/// Directory walk state: directories still to visit and the one being read.
struct Walk {
    pending: Vec<(PathBuf, String)>,
    current: Option<(fs::ReadDir, String)>,
}

/// Lazily walk regular files below a directory, yielding `/`-joined relative names.
fn walk_files(root: PathBuf) -> BoxStream<'static, io::Result<String>> {
    let walk = Walk {
        pending: vec![(root, String::new())],
        current: None,
    };
    futures::stream::try_unfold(walk, next_file).boxed()
}

async fn next_file(mut walk: Walk) -> io::Result<Option<(String, Walk)>> {
    loop {
        let Some((entries, relative)) = walk.current.as_mut() else {
            let Some((dir, relative)) = walk.pending.pop() else {
                return Ok(None);
            };
            match fs::read_dir(&dir).await {
                Ok(entries) => walk.current = Some((entries, relative)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            continue;
        };

        let Some(entry) = entries.next_entry().await? else {
            walk.current = None;
            continue;
        };

        let at_root = relative.is_empty();
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let name = if at_root {
            file_name.clone()
        } else {
            format!("{}/{}", relative, file_name)
        };

        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            if !(at_root && file_name == PROPS_DIR) {
                walk.pending.push((entry.path(), name));
            }
        } else if file_type.is_file() {
            return Ok(Some((name, walk)));
        }
    }
}

#[async_trait]
impl StorageAdapter for LocalAdapter {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn connection_descriptor(&self) -> String {
        format!("file://{}", self.base_path.display())
    }

    fn container_uri(&self, container: &str) -> String {
        format!("file://{}", self.base_path.join(container).display())
    }

    fn object_uri(&self, container: &str, name: &str) -> String {
        format!(
            "{}/{}",
            self.container_uri(container).trim_end_matches('/'),
            name
        )
    }

    async fn create_container_if_absent(&self, container: &str) -> StorageResult<()> {
        let path = self.container_path(container)?;
        fs::create_dir_all(&path)
            .await
            .map_err(|e| StorageError::from_io(e, container))?;
        Ok(())
    }

    async fn container_exists(&self, container: &str) -> StorageResult<bool> {
        let path = self.container_path(container)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::from_io(e, container)),
        }
    }

    fn list_containers(&self, prefix: Option<String>) -> BoxStream<'_, StorageResult<String>> {
        let base = self.base_path.clone();

        futures::stream::try_unfold(None::<fs::ReadDir>, move |state| {
            let base = base.clone();
            async move {
                let mut entries = match state {
                    Some(entries) => entries,
                    None => fs::read_dir(&base).await?,
                };
                Ok::<_, io::Error>(
                    entries
                        .next_entry()
                        .await?
                        .map(|entry| (entry, Some(entries))),
                )
            }
        })
        .map_err(|e| StorageError::from_io(e, "storage root"))
        .try_filter_map(move |entry| {
            let prefix = prefix.clone();
            async move {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::from_io(e, "storage root"))?;
                let name = entry.file_name().to_string_lossy().into_owned();
                let matches = file_type.is_dir()
                    && !name.starts_with('.')
                    && prefix.as_deref().map_or(true, |p| name.starts_with(p));
                Ok::<_, StorageError>(matches.then_some(name))
            }
        })
        .boxed()
    }

    async fn delete_container(&self, container: &str) -> StorageResult<()> {
        let path = self.container_path(container)?;
        let start = std::time::Instant::now();

        match fs::remove_dir_all(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    path = %path.display(),
                    "Local storage container delete failed"
                );
                return Err(StorageError::from_io(e, container));
            }
        }

        tracing::info!(
            path = %path.display(),
            container = %container,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage container delete successful"
        );

        Ok(())
    }

    fn list_objects<'a>(
        &'a self,
        container: &'a str,
        prefix: Option<&'a str>,
    ) -> BoxStream<'a, StorageResult<String>> {
        let root = match self.container_path(container) {
            Ok(root) => root,
            Err(e) => return futures::stream::once(async move { Err(e) }).boxed(),
        };
        let prefix = prefix.map(|p| p.replace('\\', "/"));

        walk_files(root)
            .map_err(move |e| StorageError::from_io(e, container))
            .try_filter(move |name| {
                let keep = prefix.as_deref().map_or(true, |p| name.starts_with(p));
                futures::future::ready(keep)
            })
            .boxed()
    }

    async fn object_exists(&self, container: &str, name: &str) -> StorageResult<bool> {
        let path = self.object_path(container, name)?;
        Self::is_file(&path).await
    }

    async fn properties(
        &self,
        container: &str,
        name: &str,
    ) -> StorageResult<Option<ObjectProperties>> {
        let path = self.object_path(container, name)?;
        let meta = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::from_io(e, name)),
        };

        let stored = Self::read_props(&self.props_path(container, name)?).await?;

        Ok(Some(ObjectProperties {
            size: meta.len(),
            content_type: stored
                .content_type
                .unwrap_or_else(|| infer_content_type(name).to_string()),
            metadata: stored.metadata,
        }))
    }

    async fn set_metadata(
        &self,
        container: &str,
        name: &str,
        metadata: HashMap<String, String>,
    ) -> StorageResult<()> {
        let path = self.object_path(container, name)?;
        if !Self::is_file(&path).await? {
            return Err(StorageError::NotFound(format!("{}/{}", container, name)));
        }

        let props_path = self.props_path(container, name)?;
        let mut stored = Self::read_props(&props_path).await?;
        stored.metadata = metadata;
        self.write_props(&props_path, &stored).await?;

        tracing::debug!(
            container = %container,
            key = %name,
            "Local storage metadata updated"
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
        let path = self.object_path(container, name)?;
        let props_path = self.props_path(container, name)?;
        let start = std::time::Instant::now();

        self.ensure_parent_dir(&path).await?;

        let key = format!("{}/{}", container, name);
        let size = self
            .write_object(&path, &key, payload)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    error = %e,
                    path = %path.display(),
                    key = %name,
                    "Local storage upload failed"
                );
            })?;

        let props = StoredProperties {
            content_type: Some(content_type.to_string()),
            metadata: HashMap::new(),
        };
        self.write_props(&props_path, &props).await?;

        tracing::info!(
            path = %path.display(),
            container = %container,
            key = %name,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(size)
    }

    async fn download(&self, container: &str, name: &str) -> StorageResult<ByteStream> {
        let path = self.object_path(container, name)?;

        if !Self::is_file(&path).await? {
            return Err(StorageError::NotFound(format!("{}/{}", container, name)));
        }

        let file = fs::File::open(&path)
            .await
            .map_err(|e| StorageError::from_io(e, &format!("{}/{}", container, name)))?;

        let key = format!("{}/{}", container, name);
        let stream = tokio_util::io::ReaderStream::new(file).map(move |result| {
            result.map_err(|e| {
                tracing::error!(error = %e, key = %key, "Local storage stream download error");
                StorageError::from_io(e, &key)
            })
        });

        Ok(Box::pin(stream))
    }

    async fn delete_object(&self, container: &str, name: &str) -> StorageResult<()> {
        let path = self.object_path(container, name)?;
        let props_path = self.props_path(container, name)?;
        let start = std::time::Instant::now();

        let container_root = self.container_path(container)?;
        let props_root = container_root.join(PROPS_DIR);

        for (target, stop) in [(&path, &container_root), (&props_path, &props_root)] {
            // A directory at the object path means no object under this name.
            if !Self::is_file(target).await? {
                continue;
            }
            match fs::remove_file(target).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    let key = format!("{}/{}", container, name);
                    return Err(StorageError::from_io(e, &key));
                }
            }
            if let Some(parent) = target.parent() {
                prune_empty_dirs(parent, stop).await;
            }
        }

        tracing::info!(
            path = %path.display(),
            container = %container,
            key = %name,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::tempdir;

    async fn adapter() -> (tempfile::TempDir, LocalAdapter) {
        let dir = tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path()).await.unwrap();
        adapter.create_container_if_absent("study").await.unwrap();
        (dir, adapter)
    }

    async fn collect(stream: ByteStream) -> Vec<u8> {
        stream
            .map(|chunk| chunk.unwrap().to_vec())
            .concat()
            .await
    }

    #[tokio::test]
    async fn test_local_upload_download() {
        let (_dir, adapter) = adapter().await;

        let written = adapter
            .upload(
                "study",
                "series/sop.dcm",
                UploadPayload::from(b"test data".to_vec()),
                "application/dicom",
            )
            .await
            .unwrap();
        assert_eq!(written, 9);

        let stream = adapter.download("study", "series/sop.dcm").await.unwrap();
        assert_eq!(collect(stream).await, b"test data");

        let props = adapter
            .properties("study", "series/sop.dcm")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(props.size, 9);
        assert_eq!(props.content_type, "application/dicom");
        assert!(props.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_dir, adapter) = adapter().await;

        let result = adapter.download("study", "../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));

        let result = adapter.delete_object("study", "a/../../b").await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));

        let result = adapter.object_exists("study", "/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));

        let result = adapter.object_exists("../etc", "passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));

        let result = adapter.object_exists("study", ".props/x.json").await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_missing_object_behaviour() {
        let (_dir, adapter) = adapter().await;

        assert!(!adapter.object_exists("study", "nope.dcm").await.unwrap());
        assert!(adapter.properties("study", "nope.dcm").await.unwrap().is_none());
        assert!(adapter.delete_object("study", "nope.dcm").await.is_ok());

        let result = adapter.download("study", "nope.dcm").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));

        let result = adapter
            .set_metadata("study", "nope.dcm", HashMap::new())
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_metadata_sidecar_round_trip() {
        let (dir, adapter) = adapter().await;
        adapter
            .upload("study", "a.json", UploadPayload::from(b"{}".to_vec()), "application/json")
            .await
            .unwrap();

        let mut metadata = HashMap::new();
        metadata.insert("meta".to_string(), "reviewed".to_string());
        adapter.set_metadata("study", "a.json", metadata).await.unwrap();

        let props = adapter.properties("study", "a.json").await.unwrap().unwrap();
        assert_eq!(props.metadata.get("meta").map(String::as_str), Some("reviewed"));
        assert_eq!(props.content_type, "application/json");
        assert!(dir.path().join("study/.props/a.json.json").exists());

        adapter.delete_object("study", "a.json").await.unwrap();
        assert!(!dir.path().join("study/.props/a.json.json").exists());
    }

    #[tokio::test]
    async fn test_missing_sidecar_infers_content_type() {
        let (dir, adapter) = adapter().await;
        std::fs::write(dir.path().join("study/scan.dcm"), b"0123").unwrap();

        let props = adapter.properties("study", "scan.dcm").await.unwrap().unwrap();
        assert_eq!(props.content_type, "application/dicom");
        assert_eq!(props.size, 4);
    }

    #[tokio::test]
    async fn test_listing_hides_sidecars_and_filters_prefix() {
        let (_dir, adapter) = adapter().await;
        for name in ["s1/a.dcm", "s1/b.dcm", "s2/c.dcm", "top.txt"] {
            adapter
                .upload("study", name, UploadPayload::from(b"x".to_vec()), "text/plain")
                .await
                .unwrap();
        }

        let mut all: Vec<String> = adapter
            .list_objects("study", None)
            .map(|r| r.unwrap())
            .collect()
            .await;
        all.sort();
        assert_eq!(all, vec!["s1/a.dcm", "s1/b.dcm", "s2/c.dcm", "top.txt"]);

        let mut s1: Vec<String> = adapter
            .list_objects("study", Some("s1/"))
            .map(|r| r.unwrap())
            .collect()
            .await;
        s1.sort();
        assert_eq!(s1, vec!["s1/a.dcm", "s1/b.dcm"]);
    }

    #[tokio::test]
    async fn test_delete_prunes_empty_directories() {
        let (dir, adapter) = adapter().await;
        for name in ["s1/deep/a.dcm", "s1/b.dcm"] {
            adapter
                .upload("study", name, UploadPayload::from(b"x".to_vec()), "text/plain")
                .await
                .unwrap();
        }

        adapter.delete_object("study", "s1/deep/a.dcm").await.unwrap();
        assert!(!dir.path().join("study/s1/deep").exists());
        assert!(!dir.path().join("study/.props/s1/deep").exists());
        assert!(dir.path().join("study/s1/b.dcm").exists());

        // Directory-shaped names are absent objects, not errors.
        assert!(!adapter.object_exists("study", "s1").await.unwrap());
        adapter.delete_object("study", "s1").await.unwrap();
        assert!(dir.path().join("study/s1/b.dcm").exists());

        adapter.delete_object("study", "s1/b.dcm").await.unwrap();
        assert!(!dir.path().join("study/s1").exists());
        assert!(dir.path().join("study").is_dir());

        adapter
            .upload("study", "s1", UploadPayload::from(b"y".to_vec()), "text/plain")
            .await
            .unwrap();
        assert!(adapter.object_exists("study", "s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_containers_lifecycle() {
        let (_dir, adapter) = adapter().await;
        adapter.create_container_if_absent("series").await.unwrap();
        adapter.create_container_if_absent("series").await.unwrap();

        let mut names: Vec<String> = adapter
            .list_containers(None)
            .map(|r| r.unwrap())
            .collect()
            .await;
        names.sort();
        assert_eq!(names, vec!["series", "study"]);

        let names: Vec<String> = adapter
            .list_containers(Some("se".to_string()))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(names, vec!["series"]);

        adapter.delete_container("series").await.unwrap();
        adapter.delete_container("series").await.unwrap();
        assert!(!adapter.container_exists("series").await.unwrap());
        assert!(adapter.container_exists("study").await.unwrap());
    }

    #[tokio::test]
    async fn test_stream_upload() {
        use std::pin::Pin;

        let (_dir, adapter) = adapter().await;
        let data = b"stream test data".to_vec();
        let cursor = std::io::Cursor::new(data.clone());
        let reader = Box::pin(cursor) as Pin<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;

        let written = adapter
            .upload(
                "study",
                "stream.bin",
                UploadPayload::Reader(reader),
                "application/octet-stream",
            )
            .await
            .unwrap();
        assert_eq!(written, data.len() as u64);

        let stream = adapter.download("study", "stream.bin").await.unwrap();
        assert_eq!(collect(stream).await, data);
    }
}
