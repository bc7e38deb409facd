use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::alerting::domain::snapshot_writer::SnapshotWriter;
use crate::alerting::domain::surveillance_store::SurveillanceStore;
use crate::capture::domain::frame_sample::FrameSample;
use crate::capture::session_registry::SessionRegistry;
use crate::config::WatchConfig;
use crate::detection::domain::face_encoder::FaceEncoder;
use crate::detection::domain::face_matcher::FaceMatcher;
use crate::detection::domain::known_faces::KnownFaces;
use crate::detection::infrastructure::known_faces_loader::{self, KnownFacesError};
use crate::pipeline::alert_coordinator::AlertCoordinator;
use crate::pipeline::detection_worker_pool::{
    DetectionSettings, DetectionWorker, DetectionWorkerPool, KnownFacesHandle,
};
use crate::pipeline::frame_collector::FrameCollector;
use crate::pipeline::frame_detection_result::FrameDetectionResult;
use crate::pipeline::pipeline_stats::{PipelineCounters, PipelineStatistics};
use crate::shared::camera_id::CameraId;
use crate::shared::graceful_thread::{GracefulThread, StopOutcome};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to spawn pipeline thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Adapters the pipeline drives.
pub struct Collaborators {
    pub registry: Arc<SessionRegistry>,
    pub encoder: Arc<dyn FaceEncoder>,
    pub matcher: Arc<dyn FaceMatcher>,
    pub store: Arc<dyn SurveillanceStore>,
    pub snapshots: Arc<dyn SnapshotWriter>,
}

/// What `stop()` could not finish within its grace periods.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub lingering_cameras: Vec<CameraId>,
    pub lingering_threads: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.lingering_cameras.is_empty() && self.lingering_threads.is_empty()
    }
}

/// Threads and queues that exist only while the pipeline runs.
struct Stages {
    collector_running: Arc<AtomicBool>,
    workers_running: Arc<AtomicBool>,
    collector: GracefulThread,
    workers: DetectionWorkerPool,
    coordinator: GracefulThread,
    detection_queue: Receiver<FrameSample>,
    results_queue: Receiver<FrameDetectionResult>,
}

/// Capture sessions → collector → worker pool → alert coordinator.
///
/// Owns every stage between the session registry and the store. Cooldown
/// state lives in the coordinator and survives a stop/start cycle.
pub struct SurveillancePipeline {
    config: WatchConfig,
    registry: Arc<SessionRegistry>,
    encoder: Arc<dyn FaceEncoder>,
    matcher: Arc<dyn FaceMatcher>,
    known: KnownFacesHandle,
    coordinator: Arc<AlertCoordinator>,
    counters: Arc<PipelineCounters>,
    stages: Option<Stages>,
}

impl SurveillancePipeline {
    pub fn new(config: WatchConfig, collaborators: Collaborators) -> Self {
        let counters = Arc::new(PipelineCounters::default());
        let snapshots = config.save_snapshots.then_some(collaborators.snapshots);
        let coordinator = Arc::new(AlertCoordinator::new(
            collaborators.store,
            snapshots,
            config.alert_cooldown(),
            counters.clone(),
        ));
        Self {
            config,
            registry: collaborators.registry,
            encoder: collaborators.encoder,
            matcher: collaborators.matcher,
            known: Arc::new(RwLock::new(Arc::new(KnownFaces::empty()))),
            coordinator,
            counters,
            stages: None,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.stages.is_some()
    }

    /// Loads known faces and starts every stage, downstream first, then all
    /// registered cameras. A missing or malformed known-face file leaves the
    /// pipeline running with nobody to recognize.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.is_running() {
            log::warn!("Pipeline already running");
            return Ok(());
        }
        if let Err(e) = self.reload_known_faces() {
            log::warn!("{e}; every face will be reported as Unknown");
            self.swap_known_faces(KnownFaces::empty());
        }

        let (detection_tx, detection_rx) =
            crossbeam_channel::bounded(self.config.detection_queue_capacity);
        let (results_tx, results_rx) =
            crossbeam_channel::bounded(self.config.results_queue_capacity);

        let coordinator = self.coordinator.clone().spawn(results_rx.clone())?;

        let workers_running = Arc::new(AtomicBool::new(true));
        let worker = Arc::new(DetectionWorker::new(
            self.encoder.clone(),
            self.matcher.clone(),
            self.known.clone(),
            DetectionSettings::from(&self.config),
        ));
        let workers = DetectionWorkerPool::spawn(
            self.config.workers,
            worker,
            detection_rx.clone(),
            results_tx,
            workers_running.clone(),
            self.config.worker_poll(),
            self.counters.clone(),
        )?;

        let collector_running = Arc::new(AtomicBool::new(true));
        let collector = FrameCollector::new(
            self.registry.clone(),
            detection_tx,
            self.config.sample_interval,
            self.config.collector_wait(),
            self.counters.clone(),
        )
        .spawn(collector_running.clone())?;

        self.registry.start_all();
        self.stages = Some(Stages {
            collector_running,
            workers_running,
            collector,
            workers,
            coordinator,
            detection_queue: detection_rx,
            results_queue: results_rx,
        });
        log::info!(
            "Pipeline started: {} cameras, {} workers",
            self.registry.len(),
            self.config.workers
        );
        Ok(())
    }

    /// Stops cameras first, then lets each stage drain into the next: the
    /// collector empties the camera queues and closes the detection queue,
    /// workers finish it and close the results channel, the coordinator
    /// handles what is left. Every wait is bounded by `stop_grace_ms`.
    pub fn stop(&mut self) -> ShutdownReport {
        let Some(stages) = self.stages.take() else {
            return ShutdownReport::default();
        };
        let grace = self.config.stop_grace();
        let mut report = ShutdownReport {
            lingering_cameras: self.registry.stop_all(),
            ..Default::default()
        };

        stages.collector_running.store(false, Ordering::Release);
        if stages.collector.join_within(grace) == StopOutcome::Lingering {
            report.lingering_threads.push(stages.collector.name().to_string());
        }

        stages.workers_running.store(false, Ordering::Release);
        report
            .lingering_threads
            .extend(stages.workers.join_within(grace));

        if stages.coordinator.join_within(grace) == StopOutcome::Lingering {
            report.lingering_threads.push(stages.coordinator.name().to_string());
        }

        if report.is_clean() {
            log::info!("Pipeline stopped");
        } else {
            log::warn!(
                "Pipeline stopped with lingering cameras {:?} and threads {:?}",
                report.lingering_cameras,
                report.lingering_threads
            );
        }
        report
    }

    /// Re-reads the known-face file. On failure the current set stays.
    /// Returns the number of encodings loaded.
    pub fn reload_known_faces(&self) -> Result<usize, KnownFacesError> {
        let known = known_faces_loader::load(&self.config.known_faces_path)?;
        let encodings = known.encoding_count();
        log::info!(
            "Loaded {encodings} encodings for {} known people",
            known.people_count()
        );
        self.swap_known_faces(known);
        Ok(encodings)
    }

    fn swap_known_faces(&self, known: KnownFaces) {
        *self.known.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(known);
    }

    pub fn statistics(&self) -> PipelineStatistics {
        let known = self
            .known
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let (workers, detection_queue_depth, results_queue_depth) = match &self.stages {
            Some(stages) => (
                stages.workers.size(),
                stages.detection_queue.len(),
                stages.results_queue.len(),
            ),
            None => (0, 0, 0),
        };
        PipelineStatistics {
            running: self.is_running(),
            workers,
            detection_queue_depth,
            results_queue_depth,
            known_people: known.people_count(),
            known_encodings: known.encoding_count(),
            ..Default::default()
        }
        .with_counters(&self.counters)
    }
}

impl Drop for SurveillancePipeline {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}
