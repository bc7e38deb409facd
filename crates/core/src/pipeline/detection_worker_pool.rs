use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::capture::domain::frame_sample::FrameSample;
use crate::config::{DetectionModel, WatchConfig};
use crate::detection::domain::face_encoder::FaceEncoder;
use crate::detection::domain::face_matcher::FaceMatcher;
use crate::detection::domain::known_faces::KnownFaces;
use crate::pipeline::frame_detection_result::{FaceDetection, FrameDetectionResult};
use crate::pipeline::pipeline_stats::PipelineCounters;
use crate::shared::graceful_thread::{GracefulThread, StopOutcome};

/// Known-face set shared with the workers. Reloading swaps the inner `Arc`,
/// so a frame in progress keeps the set it started with.
pub type KnownFacesHandle = Arc<RwLock<Arc<KnownFaces>>>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionSettings {
    pub scale: f64,
    pub model: DetectionModel,
    pub tolerance: f64,
}

impl From<&WatchConfig> for DetectionSettings {
    fn from(config: &WatchConfig) -> Self {
        Self {
            scale: config.detection_scale,
            model: config.detection_model,
            tolerance: config.match_tolerance,
        }
    }
}

/// Per-frame work shared by every worker thread.
pub struct DetectionWorker {
    encoder: Arc<dyn FaceEncoder>,
    matcher: Arc<dyn FaceMatcher>,
    known: KnownFacesHandle,
    settings: DetectionSettings,
}

impl DetectionWorker {
    pub fn new(
        encoder: Arc<dyn FaceEncoder>,
        matcher: Arc<dyn FaceMatcher>,
        known: KnownFacesHandle,
        settings: DetectionSettings,
    ) -> Self {
        Self {
            encoder,
            matcher,
            known,
            settings,
        }
    }

    fn known_faces(&self) -> Arc<KnownFaces> {
        self.known
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Detects and identifies every face in the sample. A frame without
    /// faces yields `None`.
    pub fn process_sample(
        &self,
        sample: FrameSample,
    ) -> Result<Option<FrameDetectionResult>, Box<dyn std::error::Error>> {
        let encoded = self
            .encoder
            .encode(&sample.frame, self.settings.scale, self.settings.model)?;
        if encoded.is_empty() {
            return Ok(None);
        }

        let known = self.known_faces();
        let faces = encoded
            .into_iter()
            .map(|face| {
                let identity =
                    known.identify(self.matcher.as_ref(), &face.features, self.settings.tolerance);
                FaceDetection {
                    bbox: face.bbox,
                    features: face.features,
                    name: identity.name,
                    confidence: identity.confidence,
                }
            })
            .collect();

        Ok(Some(FrameDetectionResult {
            camera_id: sample.camera_id,
            camera_name: sample.camera_name,
            timestamp: sample.timestamp,
            frame: sample.frame,
            faces,
        }))
    }
}

/// Fixed set of threads pulling from the detection-input queue.
///
/// Any worker may take any frame, so results for one camera can reach the
/// coordinator out of capture order.
pub struct DetectionWorkerPool {
    threads: Vec<GracefulThread>,
}

impl DetectionWorkerPool {
    /// Starts `workers` threads. Each exits when the input queue disconnects,
    /// when the results channel closes, or when `running` is cleared and no
    /// frame arrived within `poll`.
    pub fn spawn(
        workers: usize,
        worker: Arc<DetectionWorker>,
        input: Receiver<FrameSample>,
        results: Sender<FrameDetectionResult>,
        running: Arc<AtomicBool>,
        poll: Duration,
        counters: Arc<PipelineCounters>,
    ) -> std::io::Result<Self> {
        let threads = (0..workers)
            .map(|id| {
                let worker = worker.clone();
                let input = input.clone();
                let results = results.clone();
                let running = running.clone();
                let counters = counters.clone();
                GracefulThread::spawn(format!("detect-{id}"), move || {
                    run_worker(id, &worker, &input, &results, &running, poll, &counters)
                })
            })
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(Self { threads })
    }

    pub fn size(&self) -> usize {
        self.threads.len()
    }

    /// Waits up to `grace` for each worker in turn. Returns the names of
    /// workers that had not exited.
    pub fn join_within(&self, grace: Duration) -> Vec<String> {
        self.threads
            .iter()
            .filter_map(|t| {
                (t.join_within(grace) == StopOutcome::Lingering).then(|| t.name().to_string())
            })
            .collect()
    }
}

fn run_worker(
    id: usize,
    worker: &DetectionWorker,
    input: &Receiver<FrameSample>,
    results: &Sender<FrameDetectionResult>,
    running: &AtomicBool,
    poll: Duration,
    counters: &PipelineCounters,
) {
    log::info!("Detection worker {id} started");
    loop {
        let sample = match input.recv_timeout(poll) {
            Ok(sample) => sample,
            Err(RecvTimeoutError::Timeout) => {
                if running.load(Ordering::Acquire) {
                    continue;
                }
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let camera_name = sample.camera_name.clone();
        let outcome = worker.process_sample(sample);
        counters.frame_processed();
        match outcome {
            Ok(Some(result)) => {
                if results.send(result).is_err() {
                    log::debug!("Results channel closed, worker {id} exiting");
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                counters.detection_failed();
                log::error!("Detection failed on frame from {camera_name}: {e}");
            }
        }
    }
    log::info!("Detection worker {id} stopped");
}
