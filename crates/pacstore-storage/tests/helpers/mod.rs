use std::sync::Arc;

use pacstore_storage::{ObjectStoreAdapter, StorageAdapter, StorageService};
use tempfile::TempDir;

/// A storage service plus whatever keeps its backend alive.
pub struct TestStorage {
    pub service: StorageService,
    pub label: &'static str,
    _dir: Option<TempDir>,
}

pub async fn local_storage() -> TestStorage {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let adapter = pacstore_storage::LocalAdapter::new(dir.path())
        .await
        .expect("Failed to create local adapter");
    TestStorage {
        service: StorageService::new(Arc::new(adapter) as Arc<dyn StorageAdapter>),
        label: "local",
        _dir: Some(dir),
    }
}

pub fn memory_storage() -> TestStorage {
    TestStorage {
        service: StorageService::new(Arc::new(ObjectStoreAdapter::in_memory())),
        label: "memory",
        _dir: None,
    }
}

/// One service per backend, so every scenario runs against both.
pub async fn all_storages() -> Vec<TestStorage> {
    vec![local_storage().await, memory_storage()]
}
