#[cfg(feature = "storage-local")]
use crate::LocalAdapter;
use crate::{ObjectStoreAdapter, StorageAdapter, StorageError, StorageResult, StorageService};
use pacstore_core::{Config, StorageConnection};
use std::sync::Arc;

/// Create a storage adapter based on configuration
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn StorageAdapter>> {
    match &config.storage_connection {
        #[cfg(feature = "storage-s3")]
        StorageConnection::S3 { bucket, .. } => {
            let region = config.s3_region().ok_or_else(|| {
                StorageError::Config("S3_REGION or AWS_REGION not configured".to_string())
            })?;
            let adapter = ObjectStoreAdapter::s3(bucket, region, config.s3_endpoint())?;
            Ok(Arc::new(adapter))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageConnection::S3 { .. } => Err(StorageError::Config(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageConnection::Local { root } => {
            let adapter = LocalAdapter::new(root.clone()).await?;
            Ok(Arc::new(adapter))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageConnection::Local { .. } => Err(StorageError::Config(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        StorageConnection::Memory => Ok(Arc::new(ObjectStoreAdapter::in_memory())),
    }
}

/// Create the storage service for the configured backend
pub async fn create_storage_service(config: &Config) -> StorageResult<StorageService> {
    let adapter = create_storage(config).await?;

    tracing::info!(
        backend = %adapter.backend_type(),
        connection = %adapter.connection_descriptor(),
        "Storage service initialized"
    );

    Ok(StorageService::new(adapter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacstore_core::StorageBackend;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[tokio::test]
    async fn memory_descriptor_creates_object_store() {
        let adapter = create_storage(&config(&[("PACS_STORAGE_CONNECTION", "memory://")]))
            .await
            .unwrap();
        assert_eq!(adapter.backend_type(), StorageBackend::Memory);
    }

    #[cfg(feature = "storage-local")]
    #[tokio::test]
    async fn filesystem_descriptor_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("pacs");
        let descriptor = root.display().to_string();

        let service = create_storage_service(&config(&[("PACS_STORAGE_CONNECTION", &descriptor)]))
            .await
            .unwrap();
        assert_eq!(service.backend_type(), StorageBackend::Local);
        assert!(root.is_dir());
    }
}
