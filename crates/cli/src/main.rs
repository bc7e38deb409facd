use std::path::PathBuf;
use std::process;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use camwatch_core::alerting::infrastructure::image_snapshot_writer::ImageSnapshotWriter;
use camwatch_core::alerting::infrastructure::json_lines_store::JsonLinesStore;
use camwatch_core::capture::capture_session::SessionConfig;
use camwatch_core::capture::infrastructure::ffmpeg_capture::FfmpegCapture;
use camwatch_core::capture::session_registry::SessionRegistry;
use camwatch_core::config::{DetectionModel, WatchConfig};
use camwatch_core::detection::infrastructure::euclidean_face_matcher::EuclideanFaceMatcher;
use camwatch_core::detection::infrastructure::onnx_face_encoder::{
    OnnxFaceEncoder, DEFAULT_CONFIDENCE,
};
use camwatch_core::pipeline::surveillance_pipeline::{Collaborators, SurveillancePipeline};
use camwatch_core::shared::constants::{YOLO_MODEL_NAME, YOLO_MODEL_URL};
use camwatch_core::shared::model_resolver;

/// Watch camera streams and raise alerts for watchlisted faces.
#[derive(Parser)]
#[command(name = "camwatch")]
struct Cli {
    /// JSON configuration file (cameras, watchlist, tuning).
    #[arg(long)]
    config: Option<PathBuf>,

    /// ONNX model producing 128-component face embeddings.
    #[arg(long)]
    embedding_model: PathBuf,

    /// Face detector model (downloaded on first use when omitted).
    #[arg(long)]
    detector_model: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    confidence: f64,

    /// Directory for detection, alert and camera status records.
    #[arg(long, default_value = "records")]
    records_dir: PathBuf,

    /// Number of detection workers.
    #[arg(long)]
    workers: Option<usize>,

    /// Process every Nth collected frame.
    #[arg(long)]
    sample_interval: Option<u64>,

    /// Maximum face distance accepted as a match.
    #[arg(long)]
    tolerance: Option<f64>,

    /// Seconds between two alerts for the same person on the same camera.
    #[arg(long)]
    cooldown: Option<u64>,

    /// Detection model: fast or accurate.
    #[arg(long)]
    detection_model: Option<DetectionModel>,

    /// Do not save face snapshots.
    #[arg(long)]
    no_snapshots: bool,

    /// Seconds between statistics log lines (0 disables).
    #[arg(long, default_value = "60")]
    stats_interval: u64,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    if config.cameras.is_empty() {
        log::warn!("No cameras configured");
    }

    let store = Arc::new(JsonLinesStore::open(&cli.records_dir, config.watchlist.clone())?);
    let registry = Arc::new(SessionRegistry::new(
        Arc::new(FfmpegCapture::new(config.read_timeout())),
        store.clone(),
        SessionConfig::from(&config),
    ));
    registry.load(&config.cameras);

    let collaborators = Collaborators {
        registry,
        encoder: Arc::new(build_encoder(&cli)?),
        matcher: Arc::new(EuclideanFaceMatcher::new()),
        store,
        snapshots: Arc::new(ImageSnapshotWriter::new(
            config.snapshot_dir.clone(),
            config.snapshot_padding,
        )),
    };
    let mut pipeline = SurveillancePipeline::new(config, collaborators);
    pipeline.start()?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    log::info!("Watching; press Ctrl-C to stop");

    let interval = Duration::from_secs(cli.stats_interval);
    loop {
        let signal = if interval.is_zero() {
            rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            rx.recv_timeout(interval)
        };
        match signal {
            Err(RecvTimeoutError::Timeout) => {
                log::info!("{}", pipeline.statistics().summary());
                for status in pipeline.registry().list_statuses() {
                    log::info!(
                        "  {} ({}): {:?}, {:.1} fps, queue {}",
                        status.name,
                        status.camera_id,
                        status.state,
                        status.fps,
                        status.queue_depth
                    );
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    log::info!("Shutdown signal received, stopping pipeline...");
    let report = pipeline.stop();
    log::info!("{}", pipeline.statistics().summary());
    if !report.is_clean() {
        log::warn!(
            "{} threads and {} cameras were still exiting",
            report.lingering_threads.len(),
            report.lingering_cameras.len()
        );
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<WatchConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => WatchConfig::load(path)?,
        None => WatchConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(interval) = cli.sample_interval {
        config.sample_interval = interval;
    }
    if let Some(tolerance) = cli.tolerance {
        config.match_tolerance = tolerance;
    }
    if let Some(cooldown) = cli.cooldown {
        config.alert_cooldown_secs = cooldown;
    }
    if let Some(model) = cli.detection_model {
        config.detection_model = model;
    }
    if cli.no_snapshots {
        config.save_snapshots = false;
    }
    config.validate()?;
    Ok(config)
}

fn build_encoder(cli: &Cli) -> Result<OnnxFaceEncoder, Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let detector_path = model_resolver::resolve(
        YOLO_MODEL_NAME,
        YOLO_MODEL_URL,
        cli.detector_model.as_deref(),
    )?;
    OnnxFaceEncoder::new(&detector_path, &cli.embedding_model, cli.confidence)
}
