//! Pacstore Storage Library
//!
//! This crate maps DICOM media identifiers to storage locations and hides the
//! backend behind the [`StorageAdapter`] trait. Backends are a local
//! filesystem root and any [`object_store`] store (S3 or in-memory).
//!
//! # Storage key format
//!
//! Keys use `/` as the logical separator on every backend. For a DICOM
//! instance the key is `{study}/{series}/{instance}[/{frame}]`, lowercased.
//! The first segment names the container (after normalization) and the last
//! segment names the location inside it.
//!
//! Object names must not contain `..` segments or a leading `/`. Key
//! derivation lives in the `keys` module so all backends stay consistent.

pub mod blob;
pub mod container;
pub mod content_type;
pub mod error;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod location;
pub mod naming;
pub mod service;
pub mod traits;

// Re-export commonly used types
pub use blob::ObjectStoreAdapter;
pub use container::Container;
pub use error::{ErrorKind, StorageError, StorageResult};
pub use factory::{create_storage, create_storage_service};
pub use keys::{KeyProvider, StorageKey};
#[cfg(feature = "storage-local")]
pub use local::LocalAdapter;
pub use location::Location;
pub use pacstore_core::StorageBackend;
pub use service::StorageService;
pub use traits::{ByteStream, ObjectProperties, StorageAdapter, UploadPayload};
