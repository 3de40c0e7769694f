//! Pacstore Core Library
//!
//! This crate provides the domain types shared by all Pacstore components:
//! media identifiers, the storage connection descriptor and startup configuration.

pub mod config;
pub mod media_id;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, LogFormat};
pub use media_id::{stable_hash_of, DicomMediaId, HierarchyLevel, MediaId};
pub use storage_types::{StorageBackend, StorageConnection};
