//! Media identifiers
//!
//! A media identifier addresses one storable object by its position in the
//! DICOM hierarchy (study / series / instance / frame). Storage code never
//! inspects concrete identifier types; it only talks to the [`MediaId`]
//! capability, so callers can plug in their own identifier shapes.

use std::fmt::{self, Debug, Display, Formatter};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Recognized hierarchy levels, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyLevel {
    Study,
    Series,
    Instance,
    Frame,
}

impl HierarchyLevel {
    /// All levels in key-derivation order.
    pub const ALL: [HierarchyLevel; 4] = [
        HierarchyLevel::Study,
        HierarchyLevel::Series,
        HierarchyLevel::Instance,
        HierarchyLevel::Frame,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HierarchyLevel::Study => "study",
            HierarchyLevel::Series => "series",
            HierarchyLevel::Instance => "instance",
            HierarchyLevel::Frame => "frame",
        }
    }
}

impl Display for HierarchyLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability every identifier must provide to be storable.
///
/// Implementations return `None` from [`MediaId::component`] for levels they
/// do not carry. An identifier with no components at all is still valid: key
/// derivation falls back to [`MediaId::describe`] and then to
/// [`MediaId::stable_hash`].
pub trait MediaId: Debug + Send + Sync {
    /// Value of one hierarchy component, if present and non-empty.
    fn component(&self, level: HierarchyLevel) -> Option<String>;

    /// Stable textual representation of the identifier.
    ///
    /// The default returns `None`, meaning "no usable text".
    fn describe(&self) -> Option<String> {
        None
    }

    /// Hash that is stable across processes and toolchain versions.
    fn stable_hash(&self) -> u64;

    /// Name of the implementing type, used to reject descriptions that only
    /// echo the type name.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Present components in hierarchy order.
    fn components(&self) -> Vec<(HierarchyLevel, String)> {
        HierarchyLevel::ALL
            .iter()
            .filter_map(|level| {
                self.component(*level)
                    .filter(|value| !value.is_empty())
                    .map(|value| (*level, value))
            })
            .collect()
    }
}

/// SHA-256 based hash of a sequence of string parts, truncated to 64 bits.
///
/// Parts are length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn stable_hash_of<I, S>(parts: I) -> u64
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        let part = part.as_ref();
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// Identifier of a DICOM object, optionally narrowed to a single frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DicomMediaId {
    pub study_instance_uid: Option<String>,
    pub series_instance_uid: Option<String>,
    pub sop_instance_uid: Option<String>,
    pub frame_number: Option<u32>,
}

impl DicomMediaId {
    pub fn new(
        study_instance_uid: impl Into<String>,
        series_instance_uid: impl Into<String>,
        sop_instance_uid: impl Into<String>,
    ) -> Self {
        Self {
            study_instance_uid: Some(study_instance_uid.into()),
            series_instance_uid: Some(series_instance_uid.into()),
            sop_instance_uid: Some(sop_instance_uid.into()),
            frame_number: None,
        }
    }

    pub fn with_frame(mut self, frame_number: u32) -> Self {
        self.frame_number = Some(frame_number);
        self
    }
}

impl MediaId for DicomMediaId {
    fn component(&self, level: HierarchyLevel) -> Option<String> {
        match level {
            HierarchyLevel::Study => self.study_instance_uid.clone(),
            HierarchyLevel::Series => self.series_instance_uid.clone(),
            HierarchyLevel::Instance => self.sop_instance_uid.clone(),
            HierarchyLevel::Frame => self.frame_number.map(|n| n.to_string()),
        }
        .filter(|value| !value.is_empty())
    }

    fn describe(&self) -> Option<String> {
        let text = self.to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn stable_hash(&self) -> u64 {
        let frame = self.frame_number.map(|n| n.to_string());
        stable_hash_of([
            self.study_instance_uid.as_deref().unwrap_or_default(),
            self.series_instance_uid.as_deref().unwrap_or_default(),
            self.sop_instance_uid.as_deref().unwrap_or_default(),
            frame.as_deref().unwrap_or_default(),
        ])
    }
}

impl Display for DicomMediaId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .components()
            .into_iter()
            .map(|(level, value)| format!("{}={}", level, value))
            .collect();
        f.write_str(&parts.join(","))
    }
}
