//! Pacstore CLI: command-line front end for the media storage service.
//!
//! Set PACS_STORAGE_CONNECTION to a filesystem root, `memory://` or
//! `s3://bucket?region=..`. Set PACS_NOTIFICATION_QUEUE to publish a
//! notification after each `put`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use futures::TryStreamExt;
use pacstore_cli::{dicom_media_id, init_tracing, print_json, LocationReport};
use pacstore_core::{Config, MediaId};
use pacstore_messaging::{create_message_sender, MessageSender, StoredInstance, TransportMessage};
use pacstore_storage::{create_storage_service, Location, StorageService};

#[derive(Parser)]
#[command(name = "pacstore", about = "DICOM media storage CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Addresses one location, either by storage key or by DICOM UIDs.
#[derive(Args)]
struct Target {
    /// Storage key, e.g. "study/series/instance"
    #[arg(long, conflicts_with_all = ["study", "series", "instance", "frame"])]
    key: Option<String>,
    /// Study instance UID
    #[arg(long)]
    study: Option<String>,
    /// Series instance UID
    #[arg(long)]
    series: Option<String>,
    /// SOP instance UID
    #[arg(long)]
    instance: Option<String>,
    /// Frame number
    #[arg(long)]
    frame: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the storage key derived from DICOM UIDs
    Key {
        #[command(flatten)]
        target: Target,
    },
    /// Upload a file
    Put {
        /// Path to the file to upload
        file: PathBuf,
        #[command(flatten)]
        target: Target,
        /// Content type; inferred from the location name when omitted
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Download a location's content
    Get {
        #[command(flatten)]
        target: Target,
        /// Output file; stdout when omitted
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show a location's properties
    Stat {
        #[command(flatten)]
        target: Target,
    },
    /// Show, set or clear a location's metadata string
    Meta {
        #[command(flatten)]
        target: Target,
        /// New value
        value: Option<String>,
        /// Remove the metadata string
        #[arg(long, conflicts_with = "value")]
        clear: bool,
    },
    /// Delete a location
    Delete {
        #[command(flatten)]
        target: Target,
    },
    /// List containers
    Containers {
        /// Container name prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// List locations in a container
    Ls {
        /// Container key
        container: String,
        /// Location name prefix
        #[arg(long)]
        prefix: Option<String>,
    },
}

fn media_id(target: &Target) -> anyhow::Result<Arc<dyn MediaId>> {
    let id = dicom_media_id(
        target.study.clone(),
        target.series.clone(),
        target.instance.clone(),
        target.frame,
    )?;
    Ok(Arc::new(id))
}

async fn resolve(service: &StorageService, target: &Target) -> anyhow::Result<Location> {
    let location = match &target.key {
        Some(key) => service.resolve_key(key).await,
        None => service.resolve(media_id(target)?).await,
    };
    location.context("Resolve location")
}

/// Publish after the upload has returned, so the object is readable by then.
async fn notify_stored(
    sender: &dyn MessageSender,
    config: &Config,
    report: &LocationReport,
) -> anyhow::Result<()> {
    let Some(queue) = config.notification_queue() else {
        return Ok(());
    };

    let event = StoredInstance::new(
        report.key.clone(),
        report.id.clone(),
        report.size_bytes,
        report.content_type.clone(),
    );
    let message = TransportMessage::from_payload(queue, &event)?;
    let delay = Some(config.notification_delay).filter(|d| !d.is_zero());

    sender
        .send(&message, delay)
        .await
        .with_context(|| format!("Publish notification to {}", queue))?;

    tracing::info!(queue = %queue, event_id = %event.event_id, "Stored notification published");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context(
        "Failed to load configuration. \
         Set PACS_STORAGE_CONNECTION to a path, memory:// or s3://bucket",
    )?;
    init_tracing(config.log_format);

    let cli = Cli::parse();

    let service = create_storage_service(&config)
        .await
        .context("Failed to create storage service")?;

    match cli.command {
        Commands::Key { target } => {
            let key = match &target.key {
                Some(key) => key.clone(),
                None => service.derive_key(media_id(&target)?.as_ref()).into_string(),
            };
            let keys = service.key_provider();
            print_json(&serde_json::json!({
                "key": key,
                "container": keys.container_name(&key),
                "location": keys.location_name(&key),
            }))?;
        }
        Commands::Put {
            file,
            target,
            content_type,
        } => {
            let sender = create_message_sender(&config)
                .await
                .context("Failed to create message sender")?;

            let mut location = resolve(&service, &target).await?;
            location
                .upload(file.clone(), content_type.as_deref())
                .await
                .with_context(|| format!("Upload {}", file.display()))?;

            let report = LocationReport::collect(&mut location).await?;
            if let Some(sender) = sender {
                notify_stored(sender.as_ref(), &config, &report).await?;
            }
            print_json(&report)?;
        }
        Commands::Get { target, output } => {
            let location = resolve(&service, &target).await?;
            let copied = match output {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("Create {}", path.display()))?;
                    location.download_to(&mut file).await?
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    location.download_to(&mut stdout).await?
                }
            };
            tracing::info!(size_bytes = copied, key = %location.key(), "Download complete");
        }
        Commands::Stat { target } => {
            let mut location = resolve(&service, &target).await?;
            print_json(&LocationReport::collect(&mut location).await?)?;
        }
        Commands::Meta {
            target,
            value,
            clear,
        } => {
            let mut location = resolve(&service, &target).await?;
            if clear {
                location.set_metadata(None).await?;
            } else if let Some(value) = value.as_deref() {
                location.set_metadata(Some(value)).await?;
            }
            print_json(&serde_json::json!({
                "key": location.key(),
                "exists": location.exists().await?,
                "metadata": location.metadata().await?,
            }))?;
        }
        Commands::Delete { target } => {
            let mut location = resolve(&service, &target).await?;
            location.delete().await?;
            print_json(&serde_json::json!({
                "success": true,
                "message": format!("Location {} deleted", location.id()),
            }))?;
        }
        Commands::Containers { prefix } => {
            let names: Vec<String> = service
                .containers(prefix.as_deref())
                .map_ok(|container| container.name().to_string())
                .try_collect()
                .await?;
            print_json(&names)?;
        }
        Commands::Ls { container, prefix } => {
            if !service.container_exists(&container).await? {
                anyhow::bail!("Container {} does not exist", container);
            }
            let container = service.container(&container).await?;
            let keys: Vec<String> = container
                .locations(prefix.as_deref())
                .map_ok(|location| location.key().to_string())
                .try_collect()
                .await?;
            print_json(&keys)?;
        }
    }

    Ok(())
}
