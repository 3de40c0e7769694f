//! Named collection of locations.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use pacstore_core::MediaId;

use crate::error::{StorageError, StorageResult};
use crate::location::Location;
use crate::traits::StorageAdapter;

/// A container (directory or bucket prefix) holding locations.
#[derive(Clone)]
pub struct Container {
    adapter: Arc<dyn StorageAdapter>,
    name: String,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("backend", &self.adapter.backend_type())
            .finish()
    }
}

impl Container {
    /// `name` must already be normalized.
    pub(crate) fn new(adapter: Arc<dyn StorageAdapter>, name: impl Into<String>) -> Self {
        Self {
            adapter,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend-addressable URI of this container.
    pub fn connection(&self) -> String {
        self.adapter.container_uri(&self.name)
    }

    /// Handle for the location called `name`. The object is not created.
    pub fn location(
        &self,
        name: &str,
        media_id: Option<Arc<dyn MediaId>>,
    ) -> StorageResult<Location> {
        let key = normalize_location_name(name)?;
        Ok(Location::new(
            self.adapter.clone(),
            self.name.clone(),
            key,
            media_id,
        ))
    }

    /// Locations whose name starts with `prefix`, fetched page by page.
    pub fn locations<'a>(
        &'a self,
        prefix: Option<&'a str>,
    ) -> BoxStream<'a, StorageResult<Location>> {
        self.adapter
            .list_objects(&self.name, prefix)
            .map(move |name| {
                name.map(|name| Location::new(self.adapter.clone(), self.name.clone(), name, None))
            })
            .boxed()
    }

    /// False for empty or invalid names.
    pub async fn location_exists(&self, name: &str) -> StorageResult<bool> {
        let Ok(key) = normalize_location_name(name) else {
            return Ok(false);
        };
        match self.adapter.object_exists(&self.name, &key).await {
            Err(StorageError::InvalidArgument(_)) => Ok(false),
            other => other,
        }
    }

    /// Remove the container and its contents. Absent containers are not an error.
    pub async fn delete(&self) -> StorageResult<()> {
        self.adapter.delete_container(&self.name).await
    }
}

/// Convert platform separators to `/` and trim separators at both ends.
///
/// Empty, `.` and `..` segments are rejected so every backend sees the same name.
fn normalize_location_name(name: &str) -> StorageResult<String> {
    let key = name.replace('\\', "/");
    let key = key.trim_matches('/');
    if key.is_empty() {
        return Err(StorageError::InvalidArgument(
            "Location name cannot be empty".to_string(),
        ));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StorageError::InvalidArgument(format!(
            "Location name contains invalid segment: {:?}",
            name
        )));
    }
    Ok(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_names_use_logical_separator() {
        assert_eq!(
            normalize_location_name("a\\b\\c.dcm").unwrap(),
            "a/b/c.dcm"
        );
        assert_eq!(normalize_location_name("/x.dcm").unwrap(), "x.dcm");
        assert_eq!(normalize_location_name("x/").unwrap(), "x");
        assert_eq!(normalize_location_name("\\s1\\a.dcm\\").unwrap(), "s1/a.dcm");
    }

    #[test]
    fn location_names_reject_empty_and_relative_segments() {
        for name in ["", "//", "a//b", "./a", "a/./b", "../escape", "a/.."] {
            let err = normalize_location_name(name).unwrap_err();
            assert!(
                matches!(err, StorageError::InvalidArgument(_)),
                "{name:?}"
            );
        }
    }
}
