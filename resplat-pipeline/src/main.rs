//! resplat-pipeline: headless pipeline runner
//!
//! Drives one full pipeline run from the command line: uploads an
//! image to the 3D-generation backend, polls the job, writes the
//! generated 3D data, and (when a pre-rendered view image is given)
//! runs the capture + enhancement stages against it.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::Parser;
use resplat_common::config::PipelineConfig;
use resplat_common::events::{EventBus, PipelineEvent};
use resplat_pipeline::capture::StaticSurface;
use resplat_pipeline::store::AssetHandle;
use resplat_pipeline::PipelineOrchestrator;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "resplat-pipeline",
    about = "Turn an image into a 3D splat, then enhance a chosen view"
)]
struct Args {
    /// Input image to generate the 3D asset from
    #[arg(long)]
    image: PathBuf,

    /// Output path for the generated 3D data
    #[arg(long, default_value = "model.ply")]
    out: PathBuf,

    /// Pre-rendered view image; when given, the capture and
    /// enhancement stages run against it
    #[arg(long)]
    view: Option<PathBuf>,

    /// TOML configuration file (RESPLAT_* environment variables
    /// override file values)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    info!("Starting resplat-pipeline");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = PipelineConfig::load(args.config.as_deref())?;
    let events = EventBus::new(100);
    spawn_progress_logger(&events);

    let orchestrator = PipelineOrchestrator::new(&config, events)?;

    match orchestrator.job_client().health().await {
        Ok(health) => info!(
            queued = health.jobs.in_queue,
            in_progress = health.jobs.in_progress,
            idle_workers = health.workers.idle,
            "generation endpoint healthy"
        ),
        Err(e) => warn!(error = %e, "generation endpoint health check failed"),
    }

    let payload = load_image_as_data_uri(&args.image)?;
    let name = args
        .image
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "input.png".to_string());

    orchestrator
        .confirm_upload(payload, name, None)
        .await
        .map_err(|e| anyhow::anyhow!("generation failed: {}", e))?;

    let store = orchestrator.store();
    match store.generated_handle() {
        Some(AssetHandle::Remote(url)) => {
            info!(url = %url, "generated asset is remote; not written locally")
        }
        Some(AssetHandle::Blob(_)) => {
            let bytes = store
                .generated_bytes()
                .context("generated asset handle has no backing bytes")?;
            std::fs::write(&args.out, bytes.as_ref())
                .with_context(|| format!("cannot write {}", args.out.display()))?;
            info!(path = %args.out.display(), size = bytes.len(), "3D data written");
        }
        None => bail!("pipeline finished without a generated asset"),
    }

    if let Some(view_path) = args.view {
        let surface = StaticSurface::new(load_image_as_data_uri(&view_path)?);

        // No live renderer here: fire the frame signal once the
        // capture cycle has armed.
        let signal = orchestrator.capture_bridge().frame_signal();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            signal.frame_end();
        });

        orchestrator
            .request_capture(&surface)
            .await
            .map_err(|e| anyhow::anyhow!("enhancement failed: {}", e))?;

        match store.enhanced_result() {
            Some(result) => info!(result = %result, "enhanced image ready"),
            None => bail!("pipeline finished without an enhanced result"),
        }
    }

    Ok(())
}

/// Read an image file into data-URI form, sniffing its MIME type
fn load_image_as_data_uri(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let kind = infer::get(&bytes)
        .with_context(|| format!("{} is not a recognized file type", path.display()))?;
    if !kind.mime_type().starts_with("image/") {
        bail!(
            "{} is not an image (detected {})",
            path.display(),
            kind.mime_type()
        );
    }
    Ok(format!(
        "data:{};base64,{}",
        kind.mime_type(),
        BASE64.encode(&bytes)
    ))
}

/// Log stage transitions and job progress from the event bus
fn spawn_progress_logger(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                PipelineEvent::StageChanged {
                    old_stage,
                    new_stage,
                    ..
                } => info!(from = %old_stage, to = %new_stage, "stage"),
                PipelineEvent::JobSubmitted { job_id, .. } => {
                    info!(job_id = %job_id, "job submitted")
                }
                PipelineEvent::JobProgress {
                    status, attempt, ..
                } => info!(status = %status, attempt, "polling"),
                PipelineEvent::ErrorRaised { message, .. } => {
                    warn!(message = %message, "pipeline error")
                }
                _ => {}
            }
        }
    });
}
