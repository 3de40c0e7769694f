//! Storage key derivation.
//!
//! Key format: the identifier's present hierarchy components, outermost first,
//! joined by `/` and lower-cased, e.g. `study/series/instance[/frame]`.
//!
//! The first segment of a key names the container and the last segment names
//! the location inside it. Segments in between are not addressable through
//! [`KeyProvider::container_name`] or [`KeyProvider::location_name`].

use std::fmt::{self, Display, Formatter};

use pacstore_core::MediaId;

/// Separator used both to build keys and to split them.
pub const LOGICAL_SEPARATOR: &str = "/";

/// Flat storage key derived from a [`MediaId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for StorageKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StorageKey {
    fn from(value: &str) -> Self {
        StorageKey(value.to_string())
    }
}

impl From<String> for StorageKey {
    fn from(value: String) -> Self {
        StorageKey(value)
    }
}

/// Derives storage keys from media identifiers and splits keys into
/// container and location names.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyProvider;

impl KeyProvider {
    pub fn new() -> Self {
        KeyProvider
    }

    /// Derive the storage key for `media_id`. Never fails.
    ///
    /// Tiers, in order: hierarchy components; the sanitized textual
    /// representation; `media_<hash>` from the identifier's stable hash.
    pub fn derive_key(&self, media_id: &dyn MediaId) -> StorageKey {
        let parts: Vec<String> = media_id
            .components()
            .into_iter()
            .map(|(_, value)| value)
            .collect();

        if !parts.is_empty() {
            return StorageKey(parts.join(LOGICAL_SEPARATOR).to_lowercase());
        }

        if let Some(text) = media_id
            .describe()
            .filter(|text| !text.is_empty() && text != media_id.type_name())
        {
            tracing::debug!(media_id = ?media_id, "No hierarchy components, using textual key");
            return StorageKey(sanitize(&text));
        }

        tracing::debug!(media_id = ?media_id, "No usable identifier text, using hashed key");
        StorageKey(format!("media_{}", media_id.stable_hash()))
    }

    pub fn logical_separator(&self) -> &'static str {
        LOGICAL_SEPARATOR
    }

    /// Content up to the first separator, after trimming outer separators.
    pub fn container_name(&self, key: &str) -> String {
        let key = key.trim_matches('/');
        match key.find(LOGICAL_SEPARATOR) {
            Some(index) => key[..index].to_string(),
            None => key.to_string(),
        }
    }

    /// Content after the last separator, after trimming outer separators.
    pub fn location_name(&self, key: &str) -> String {
        let key = key.trim_matches('/');
        match key.rfind(LOGICAL_SEPARATOR) {
            Some(index) => key[index + LOGICAL_SEPARATOR.len()..].to_string(),
            None => key.to_string(),
        }
    }
}

/// Replace everything outside `[A-Za-z0-9.-]` with `_` and lower-case.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacstore_core::{DicomMediaId, HierarchyLevel};

    #[derive(Debug)]
    struct OpaqueId {
        text: Option<String>,
        hash: u64,
    }

    impl MediaId for OpaqueId {
        fn component(&self, _level: HierarchyLevel) -> Option<String> {
            None
        }

        fn describe(&self) -> Option<String> {
            self.text.clone()
        }

        fn stable_hash(&self) -> u64 {
            self.hash
        }
    }

    #[test]
    fn joins_components_lowercased() {
        let id = DicomMediaId::new("A", "B", "C");
        let key = KeyProvider.derive_key(&id);
        assert_eq!(key.as_str(), "a/b/c");
    }

    #[test]
    fn derivation_is_deterministic() {
        let id = DicomMediaId::new("1.2.840.113619", "1.2.840.5", "1.2.840.9").with_frame(3);
        let first = KeyProvider.derive_key(&id);
        let second = KeyProvider::new().derive_key(&id);
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "1.2.840.113619/1.2.840.5/1.2.840.9/3");
    }

    #[test]
    fn partial_identifier_skips_missing_levels() {
        let id = DicomMediaId {
            study_instance_uid: Some("Study".to_string()),
            series_instance_uid: None,
            sop_instance_uid: Some("Sop".to_string()),
            frame_number: None,
        };
        assert_eq!(KeyProvider.derive_key(&id).as_str(), "study/sop");
    }

    #[test]
    fn falls_back_to_sanitized_text() {
        let id = OpaqueId {
            text: Some("Report #7 (final).PDF".to_string()),
            hash: 1,
        };
        assert_eq!(KeyProvider.derive_key(&id).as_str(), "report__7__final_.pdf");
    }

    #[test]
    fn falls_back_to_hash_when_text_unusable() {
        let empty = OpaqueId {
            text: Some(String::new()),
            hash: 42,
        };
        assert_eq!(KeyProvider.derive_key(&empty).as_str(), "media_42");

        let type_name = OpaqueId {
            text: Some(std::any::type_name::<OpaqueId>().to_string()),
            hash: 7,
        };
        assert_eq!(KeyProvider.derive_key(&type_name).as_str(), "media_7");

        let key = KeyProvider.derive_key(&DicomMediaId::default());
        assert!(key.as_str().starts_with("media_"));
        assert_eq!(key, KeyProvider.derive_key(&DicomMediaId::default()));
    }

    #[test]
    fn splits_container_and_location() {
        let keys = KeyProvider;
        assert_eq!(keys.container_name("Study1/series2/sop3"), "Study1");
        assert_eq!(keys.location_name("Study1/series2/sop3"), "sop3");
        assert_eq!(keys.container_name("/a/b/"), "a");
        assert_eq!(keys.location_name("/a/b/"), "b");
        assert_eq!(keys.container_name("single"), "single");
        assert_eq!(keys.location_name("single"), "single");
        assert_eq!(keys.container_name(""), "");
        assert_eq!(keys.location_name(""), "");
        assert_eq!(keys.logical_separator(), "/");
    }

    #[test]
    fn two_segment_keys_round_trip() {
        let keys = KeyProvider;
        let key = "container/object.dcm";
        let rebuilt = format!(
            "{}{}{}",
            keys.container_name(key),
            keys.logical_separator(),
            keys.location_name(key)
        );
        assert_eq!(rebuilt, key);
    }
}
