use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Prefix that expands to the platform data directory.
pub const DATA_DIRECTORY_TOKEN: &str = "|datadirectory|";

/// Storage backend types
///
/// This enum defines the available storage backend types.
/// It's defined in core because it's selected from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    S3,
    Memory,
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::Local => write!(f, "local"),
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Parsed storage connection descriptor.
///
/// A single descriptor string selects the backend:
///
/// - `|DataDirectory|/pacs` or `/var/lib/pacs`: filesystem root
/// - `memory://`: in-process object store
/// - `s3://bucket?region=eu-west-1&endpoint=http://localhost:9000`: S3 bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConnection {
    Local {
        root: PathBuf,
    },
    S3 {
        bucket: String,
        region: Option<String>,
        endpoint: Option<String>,
    },
    Memory,
}

impl StorageConnection {
    pub fn backend(&self) -> StorageBackend {
        match self {
            StorageConnection::Local { .. } => StorageBackend::Local,
            StorageConnection::S3 { .. } => StorageBackend::S3,
            StorageConnection::Memory => StorageBackend::Memory,
        }
    }

    /// Parse a descriptor, expanding `|DataDirectory|` against `data_dir`.
    pub fn parse_with_data_dir(
        descriptor: &str,
        data_dir: Option<&Path>,
    ) -> Result<Self, anyhow::Error> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(anyhow::anyhow!("Storage connection descriptor is empty"));
        }

        if let Some(rest) = strip_prefix_ignore_case(descriptor, DATA_DIRECTORY_TOKEN) {
            let base = data_dir.ok_or_else(|| {
                anyhow::anyhow!("Cannot expand {} without a data directory", DATA_DIRECTORY_TOKEN)
            })?;
            let rest = rest.trim_start_matches(['/', '\\']);
            return Ok(StorageConnection::Local {
                root: base.join(rest),
            });
        }

        if let Some(rest) = strip_prefix_ignore_case(descriptor, "memory://") {
            if !rest.is_empty() {
                return Err(anyhow::anyhow!(
                    "memory:// descriptor does not take a path: {}",
                    descriptor
                ));
            }
            return Ok(StorageConnection::Memory);
        }

        if let Some(rest) = strip_prefix_ignore_case(descriptor, "s3://") {
            return parse_s3(rest);
        }

        if let Some(rest) = strip_prefix_ignore_case(descriptor, "file://") {
            let root = PathBuf::from(rest);
            if root.is_absolute() {
                return Ok(StorageConnection::Local { root });
            }
            return Err(anyhow::anyhow!(
                "file:// descriptor must be an absolute path: {}",
                descriptor
            ));
        }

        let root = PathBuf::from(descriptor);
        if root.is_absolute() {
            return Ok(StorageConnection::Local { root });
        }

        Err(anyhow::anyhow!(
            "Unrecognized storage connection descriptor: {}",
            descriptor
        ))
    }
}

impl FromStr for StorageConnection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data_dir = dirs::data_dir();
        Self::parse_with_data_dir(s, data_dir.as_deref())
    }
}

impl Display for StorageConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageConnection::Local { root } => write!(f, "file://{}", root.display()),
            StorageConnection::S3 { bucket, .. } => write!(f, "s3://{}", bucket),
            StorageConnection::Memory => write!(f, "memory://"),
        }
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn parse_s3(rest: &str) -> Result<StorageConnection, anyhow::Error> {
    let (bucket, query) = match rest.split_once('?') {
        Some((bucket, query)) => (bucket, Some(query)),
        None => (rest, None),
    };
    let bucket = bucket.trim_end_matches('/');
    if bucket.is_empty() || bucket.contains('/') {
        return Err(anyhow::anyhow!("Invalid S3 bucket in descriptor: {:?}", bucket));
    }

    let mut region = None;
    let mut endpoint = None;
    for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Invalid S3 descriptor option: {}", pair))?;
        match key {
            "region" => region = Some(value.to_string()),
            "endpoint" => endpoint = Some(value.to_string()),
            other => return Err(anyhow::anyhow!("Unknown S3 descriptor option: {}", other)),
        }
    }

    Ok(StorageConnection::S3 {
        bucket: bucket.to_string(),
        region,
        endpoint,
    })
}
