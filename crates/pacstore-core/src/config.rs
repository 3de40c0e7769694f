//! Configuration module
//!
//! Startup configuration for the storage service and its collaborators. The
//! storage core itself reads nothing from the environment; this module turns
//! environment variables into a parsed [`StorageConnection`] once, at startup.

use std::env;
use std::time::Duration;

use crate::storage_types::StorageConnection;

const NOTIFICATION_DELAY_SECS: u64 = 0;

/// Log output format for binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub storage_connection: StorageConnection,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub aws_region: Option<String>,
    pub notification_queue: Option<String>,
    pub notification_delay: Duration,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        let storage_connection: StorageConnection = non_empty("PACS_STORAGE_CONNECTION")
            .ok_or_else(|| anyhow::anyhow!("PACS_STORAGE_CONNECTION must be set"))?
            .parse()?;

        let log_format = match non_empty("PACS_LOG_FORMAT")
            .map(|s| s.to_lowercase())
            .as_deref()
        {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(anyhow::anyhow!(
                    "PACS_LOG_FORMAT must be 'text' or 'json', got '{}'",
                    other
                ))
            }
        };

        let notification_delay = match non_empty("PACS_NOTIFICATION_DELAY_SECS") {
            None => NOTIFICATION_DELAY_SECS,
            Some(value) => value.trim().parse().map_err(|_| {
                anyhow::anyhow!(
                    "PACS_NOTIFICATION_DELAY_SECS must be a whole number of seconds, got '{}'",
                    value
                )
            })?,
        };

        let config = Config {
            storage_connection,
            s3_region: non_empty("S3_REGION"),
            s3_endpoint: non_empty("S3_ENDPOINT"),
            aws_region: non_empty("AWS_REGION"),
            notification_queue: non_empty("PACS_NOTIFICATION_QUEUE"),
            notification_delay: Duration::from_secs(notification_delay),
            log_format,
        };

        config.validate()?;
        Ok(config)
    }

    /// Region for an S3 connection: descriptor first, then `S3_REGION`, then `AWS_REGION`.
    pub fn s3_region(&self) -> Option<&str> {
        match &self.storage_connection {
            StorageConnection::S3 {
                region: Some(region),
                ..
            } => Some(region.as_str()),
            _ => self.s3_region.as_deref().or(self.aws_region.as_deref()),
        }
    }

    /// Endpoint for S3-compatible providers: descriptor first, then `S3_ENDPOINT`.
    pub fn s3_endpoint(&self) -> Option<&str> {
        match &self.storage_connection {
            StorageConnection::S3 {
                endpoint: Some(endpoint),
                ..
            } => Some(endpoint.as_str()),
            _ => self.s3_endpoint.as_deref(),
        }
    }

    pub fn notification_queue(&self) -> Option<&str> {
        self.notification_queue.as_deref()
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if let StorageConnection::S3 { .. } = self.storage_connection {
            if self.s3_region().is_none() {
                return Err(anyhow::anyhow!(
                    "S3 storage requires a region (descriptor ?region=, S3_REGION or AWS_REGION)"
                ));
            }
        }

        if let Some(queue) = &self.notification_queue {
            if queue.len() > 80 {
                return Err(anyhow::anyhow!(
                    "PACS_NOTIFICATION_QUEUE must be at most 80 characters"
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_types::StorageBackend;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, anyhow::Error> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn missing_connection_is_an_error() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("PACS_STORAGE_CONNECTION"));
    }

    #[test]
    fn filesystem_defaults() {
        let config = config_from(&[("PACS_STORAGE_CONNECTION", "/srv/pacs")]).unwrap();
        assert_eq!(config.storage_connection.backend(), StorageBackend::Local);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.notification_delay, Duration::ZERO);
    }

    #[test]
    fn s3_requires_region() {
        assert!(config_from(&[("PACS_STORAGE_CONNECTION", "s3://bucket")]).is_err());

        let config = config_from(&[
            ("PACS_STORAGE_CONNECTION", "s3://bucket"),
            ("AWS_REGION", "us-east-1"),
        ])
        .unwrap();
        assert_eq!(config.s3_region(), Some("us-east-1"));
    }

    #[test]
    fn descriptor_region_wins_over_environment() {
        let config = config_from(&[
            ("PACS_STORAGE_CONNECTION", "s3://bucket?region=eu-west-1"),
            ("S3_REGION", "us-east-1"),
            ("S3_ENDPOINT", "http://minio:9000"),
        ])
        .unwrap();
        assert_eq!(config.s3_region(), Some("eu-west-1"));
        assert_eq!(config.s3_endpoint(), Some("http://minio:9000"));
    }

    #[test]
    fn notification_and_logging_options() {
        let config = config_from(&[
            ("PACS_STORAGE_CONNECTION", "memory://"),
            ("PACS_NOTIFICATION_QUEUE", "stored-instances"),
            ("PACS_NOTIFICATION_DELAY_SECS", "15"),
            ("PACS_LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(config.notification_queue(), Some("stored-instances"));
        assert_eq!(config.notification_delay, Duration::from_secs(15));
        assert_eq!(config.log_format, LogFormat::Json);

        assert!(config_from(&[
            ("PACS_STORAGE_CONNECTION", "memory://"),
            ("PACS_LOG_FORMAT", "xml"),
        ])
        .is_err());
    }

    #[test]
    fn malformed_notification_delay_is_rejected() {
        for value in ["soon", "-5", "1.5"] {
            let err = config_from(&[
                ("PACS_STORAGE_CONNECTION", "memory://"),
                ("PACS_NOTIFICATION_DELAY_SECS", value),
            ])
            .unwrap_err();
            assert!(
                err.to_string().contains("PACS_NOTIFICATION_DELAY_SECS"),
                "{value}"
            );
        }

        let config = config_from(&[
            ("PACS_STORAGE_CONNECTION", "memory://"),
            ("PACS_NOTIFICATION_DELAY_SECS", " 30 "),
        ])
        .unwrap();
        assert_eq!(config.notification_delay, Duration::from_secs(30));
    }
}
