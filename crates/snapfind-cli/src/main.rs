use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use snapfind_client::{GuestClient, Role, StaffClient};
use snapfind_core::{
    lookup_labels, ApiError, BatchScope, CameraBackend, CameraSessionManager, Controller,
    DownloadOrchestrator, DownloadOutcome, DownloadSummary, EventId, Facing, GuestApi, PhotoSource,
    WorkflowError, WorkflowState,
};
use snapfind_hw::{AlbumStore, Camera, StillImageCamera, V4lBackend};
use std::path::PathBuf;
use std::time::Duration;

mod config;

use config::Config;

const NOT_READY_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "snapfind", about = "Find your event photos by face")]
struct Cli {
    /// TOML config file (default: $SNAPFIND_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that an event is open for face scanning
    Event {
        event: EventId,
    },
    /// Capture your face, list matching photos, optionally download them
    Scan(ScanArgs),
    /// List V4L2 capture devices
    Devices,
    /// Admin and photographer commands
    Admin {
        /// Account role the token belongs to
        #[arg(long, default_value = "admin")]
        role: Role,

        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Args)]
struct ScanArgs {
    event: EventId,

    /// Camera lens to use
    #[arg(long, default_value = "front")]
    facing: Facing,

    /// Use an image file instead of a camera
    #[arg(long)]
    image: Option<PathBuf>,

    /// Download these photo ids (comma-separated), as printed in the results
    #[arg(long, value_delimiter = ',', conflicts_with = "download_all")]
    select: Vec<String>,

    /// Download every matched photo
    #[arg(long)]
    download_all: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum AdminCommands {
    /// List events
    Events,
    /// List the photos of an event
    Photos { event: EventId },
    /// Download photos of an event into the album
    Download {
        event: EventId,
        /// Only these photo ids (comma-separated); default is all
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
    },
    /// Re-run face indexing for an event
    Reindex { event: EventId },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Event { event } => show_event(&config, &event).await,
        Commands::Scan(args) => {
            if let Some(path) = args.image.clone() {
                scan(&config, StillImageCamera::new(path), &args).await
            } else {
                let backend = V4lBackend::new(
                    config.front_camera.clone(),
                    config.back_camera.clone(),
                    config.warmup_frames,
                );
                scan(&config, backend, &args).await
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
            Ok(())
        }
        Commands::Admin { role, command } => admin(&config, role, command).await,
    }
}

async fn show_event(config: &Config, event: &EventId) -> Result<()> {
    let client = GuestClient::new(config.api_base()?, config.request_timeout())?;
    match client.event_info(event).await {
        Ok(info) => {
            println!("{}", info.summary);
            Ok(())
        }
        Err(ApiError::EventExpired) => bail!(WorkflowError::EventExpired.user_message()),
        Err(e) => Err(e).context("failed to load event"),
    }
}

async fn scan<C: CameraBackend>(config: &Config, camera: C, args: &ScanArgs) -> Result<()> {
    let base = config.api_base()?;
    let secure = config.secure_context(&base);
    let api = GuestClient::new(base, config.request_timeout())?;
    let store = AlbumStore::new(&config.album_dir, &args.event);
    let camera = CameraSessionManager::new(camera, secure).with_jpeg_quality(config.jpeg_quality);

    let mut controller = Controller::new(
        args.event.clone(),
        config.workflow(args.facing),
        camera,
        api,
        store,
    );

    let result = run_scan(&mut controller, config, args).await;
    controller.teardown();
    result
}

async fn run_scan<C, A, S>(
    controller: &mut Controller<C, A, S>,
    config: &Config,
    args: &ScanArgs,
) -> Result<()>
where
    C: CameraBackend,
    A: GuestApi,
    S: snapfind_core::PhotoStore,
{
    if let Err(e) = controller.load_event().await {
        bail!(e.user_message());
    }
    if controller.state() == WorkflowState::Idle {
        if let Err(e) = controller.start_camera().await {
            bail!(e.user_message());
        }
    }

    let mut matched = None;
    for attempt in 1..=config.capture_attempts.max(1) {
        match controller.capture().await {
            Ok(count) => {
                matched = Some(count);
                break;
            }
            Err(WorkflowError::CaptureNotReady) => {
                tracing::debug!(attempt, "camera not ready; retrying");
                tokio::time::sleep(NOT_READY_BACKOFF).await;
            }
            Err(e) => bail!(e.user_message()),
        }
    }
    if matched.is_none() {
        bail!(WorkflowError::CaptureNotReady.user_message());
    }

    let photos = controller.results().unwrap_or_default().to_vec();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&photos)?);
    } else {
        if let Some(notice) = controller.notice() {
            println!("{}", notice.text);
        }
        let base = controller.api().base().clone();
        for photo in &photos {
            println!("  {}  {}", photo.id, base.resolve(&photo.download_url));
        }
    }

    let scope = if args.download_all {
        BatchScope::All
    } else if !args.select.is_empty() {
        let lookup = lookup_labels(&photos, &args.select);
        if let Some(label) = lookup.unknown.first() {
            bail!("Photo {label} is not in the results.");
        }
        for id in &lookup.found {
            controller
                .toggle_selection(id)
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        }
        BatchScope::Selected
    } else {
        return Ok(());
    };

    let summary = controller
        .download_batch(scope, print_progress)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    finish_batch(&summary)
}

async fn admin(config: &Config, role: Role, command: AdminCommands) -> Result<()> {
    let client = StaffClient::new(
        config.api_base()?,
        role,
        config.auth_token.clone(),
        config.request_timeout(),
    )?;

    match command {
        AdminCommands::Events => {
            for event in client.events().await? {
                println!(
                    "{:>5}  {}  {}  {}",
                    event.id,
                    event.name,
                    event.date.as_deref().unwrap_or("-"),
                    event.status.as_deref().unwrap_or("-"),
                );
            }
        }
        AdminCommands::Photos { event } => {
            let photos = client.event_photos(&event).await?;
            println!("{}", serde_json::to_string_pretty(&photos)?);
        }
        AdminCommands::Download { event, ids } => {
            let mut photos = client.event_photos(&event).await?;
            if !ids.is_empty() {
                let lookup = lookup_labels(&photos, &ids);
                if !lookup.unknown.is_empty() {
                    tracing::warn!(unknown = ?lookup.unknown, "some ids not found");
                }
                photos.retain(|p| lookup.found.contains(&p.id));
            }
            if photos.is_empty() {
                bail!(WorkflowError::NothingSelected.user_message());
            }

            let mut store = AlbumStore::new(&config.album_dir, &event);
            let outcomes = DownloadOrchestrator::new(&client, &mut store)
                .download_many_with_progress(&photos, print_progress)
                .await
                .map_err(|e| anyhow::anyhow!(WorkflowError::from(e).user_message()))?;
            finish_batch(&DownloadSummary::new(outcomes))?;
        }
        AdminCommands::Reindex { event } => {
            println!("{}", client.reindex(&event).await?);
        }
    }
    Ok(())
}

fn print_progress(done: usize, total: usize, outcome: &DownloadOutcome) {
    match (&outcome.location, &outcome.error_detail) {
        (Some(location), _) => println!("[{done}/{total}] {} -> {location}", outcome.id),
        (None, detail) => println!(
            "[{done}/{total}] {} failed: {}",
            outcome.id,
            detail.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn finish_batch(summary: &DownloadSummary) -> Result<()> {
    println!("{}", summary.message());
    match summary.as_error() {
        Some(e) => bail!(e.user_message()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapfind_core::{PhotoDescriptor, PhotoId};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("snapfind").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_select_keeps_typed_labels() {
        let Commands::Scan(args) = parse(&["scan", "42", "--select", "0042,7,0042"]).command else {
            panic!("expected scan");
        };
        assert_eq!(args.select, vec!["0042", "7", "0042"]);

        let photos = vec![
            PhotoDescriptor::new("0042", "/api/photo/download/0042"),
            PhotoDescriptor::new(7, "/api/photo/download/7"),
        ];
        let lookup = lookup_labels(&photos, &args.select);
        assert_eq!(
            lookup.found,
            vec![PhotoId::Text("0042".into()), PhotoId::Int(7)]
        );
    }

    #[test]
    fn test_select_conflicts_with_download_all() {
        let result = Cli::try_parse_from(["snapfind", "scan", "42", "--select", "1", "--download-all"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_admin_download_ids_are_raw() {
        let Commands::Admin {
            command: AdminCommands::Download { ids, .. },
            ..
        } = parse(&["admin", "download", "3", "--ids", "0042,b7"]).command
        else {
            panic!("expected admin download");
        };
        assert_eq!(ids, vec!["0042", "b7"]);
    }
}
