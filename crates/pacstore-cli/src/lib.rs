use anyhow::Context;
use pacstore_core::{DicomMediaId, LogFormat};
use pacstore_storage::{Location, StorageResult};
use serde::Serialize;

/// Initialize tracing for CLI binaries.
///
/// Filter from `RUST_LOG`, default `info`. Logs go to stderr so JSON output on
/// stdout stays parseable.
pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// Build a DICOM identifier from command-line parts.
pub fn dicom_media_id(
    study: Option<String>,
    series: Option<String>,
    instance: Option<String>,
    frame: Option<u32>,
) -> anyhow::Result<DicomMediaId> {
    let media_id = DicomMediaId {
        study_instance_uid: study,
        series_instance_uid: series,
        sop_instance_uid: instance,
        frame_number: frame,
    };
    if media_id.study_instance_uid.is_none() {
        anyhow::bail!("--study is required unless --key is given");
    }
    Ok(media_id)
}

/// What `stat` and `put` print about a location.
#[derive(Debug, Serialize)]
pub struct LocationReport {
    pub id: String,
    pub container: String,
    pub key: String,
    pub exists: bool,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub metadata: Option<String>,
}

impl LocationReport {
    pub async fn collect(location: &mut Location) -> StorageResult<Self> {
        Ok(Self {
            id: location.id(),
            container: location.container_name().to_string(),
            key: location.key().to_string(),
            exists: location.exists().await?,
            size_bytes: location.size().await?,
            content_type: location.content_type().await?,
            metadata: location.metadata().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacstore_storage::{ObjectStoreAdapter, StorageService};
    use std::sync::Arc;

    #[test]
    fn study_is_required() {
        assert!(dicom_media_id(None, Some("s".into()), None, None).is_err());
        let id = dicom_media_id(Some("1.2".into()), None, None, Some(3)).unwrap();
        assert_eq!(id.frame_number, Some(3));
    }

    #[tokio::test]
    async fn report_reflects_stored_object() {
        let service = StorageService::new(Arc::new(ObjectStoreAdapter::in_memory()));
        let mut location = service.resolve_key("study/scan.dcm").await.unwrap();

        let report = LocationReport::collect(&mut location).await.unwrap();
        assert!(!report.exists);
        assert_eq!(report.size_bytes, 0);

        location.upload(b"0123456789".to_vec(), None).await.unwrap();
        location.set_metadata(Some("checked")).await.unwrap();

        let report = LocationReport::collect(&mut location).await.unwrap();
        assert!(report.exists);
        assert_eq!(report.size_bytes, 10);
        assert_eq!(report.content_type.as_deref(), Some("application/dicom"));
        assert_eq!(report.metadata.as_deref(), Some("checked"));
        assert_eq!(report.id, "memory:///study/scan.dcm");
    }
}
