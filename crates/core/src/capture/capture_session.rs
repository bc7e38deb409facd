use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use thiserror::Error;

use crate::alerting::domain::surveillance_store::{CameraStatus, SurveillanceStore};
use crate::capture::domain::capture_source::{CaptureHandle, CaptureSource};
use crate::capture::domain::frame_sample::FrameSample;
use crate::capture::domain::source_locator::SourceLocator;
use crate::config::WatchConfig;
use crate::shared::camera_id::CameraId;
use crate::shared::constants::FPS_WINDOW_SECS;
use crate::shared::frame::Frame;
use crate::shared::graceful_thread::{GracefulThread, StopOutcome};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("previous capture loop for camera {0} has not exited yet")]
    PreviousLoopActive(CameraId),
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Timing and capacity knobs shared by every capture session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub queue_capacity: usize,
    pub reconnect_delay: Duration,
    pub read_retry_delay: Duration,
    pub error_threshold: u32,
    pub stop_grace: Duration,
}

impl From<&WatchConfig> for SessionConfig {
    fn from(config: &WatchConfig) -> Self {
        Self {
            queue_capacity: config.camera_queue_capacity,
            reconnect_delay: config.reconnect_delay(),
            read_retry_delay: config.read_retry_delay(),
            error_threshold: config.error_threshold,
            stop_grace: config.stop_grace(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Read-only snapshot of a session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionStatus {
    pub camera_id: CameraId,
    pub name: String,
    pub source: SourceLocator,
    pub running: bool,
    pub state: ConnectionState,
    pub fps: f64,
    pub queue_depth: usize,
    pub error_count: u32,
    pub last_error: Option<String>,
}

struct Health {
    state: ConnectionState,
    fps: f64,
    error_count: u32,
    last_error: Option<String>,
}

/// State read from outside the capture thread. Each piece has its own lock
/// so status reads never wait on a frame copy and vice versa.
struct SessionShared {
    health: Mutex<Health>,
    latest_frame: Mutex<Option<Frame>>,
}

impl SessionShared {
    fn health(&self) -> std::sync::MutexGuard<'_, Health> {
        self.health.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Owns one camera: a capture thread running a connect/read/reconnect loop,
/// the latest decoded frame and a bounded per-camera frame queue.
///
/// `stop()` waits at most `stop_grace` for the loop. A read blocked inside
/// the capture driver cannot be interrupted, so the loop may still be
/// mid-read when `stop()` returns [`StopOutcome::Lingering`]; it exits and
/// releases its handle as soon as that read returns.
pub struct CaptureSession {
    camera_id: CameraId,
    name: String,
    source: SourceLocator,
    config: SessionConfig,
    capture: Arc<dyn CaptureSource>,
    store: Arc<dyn SurveillanceStore>,
    shared: Arc<SessionShared>,
    running: Arc<AtomicBool>,
    frame_tx: Sender<FrameSample>,
    frame_rx: Receiver<FrameSample>,
    stop_tx: Option<Sender<()>>,
    thread: Option<Arc<GracefulThread>>,
}

/// A stop that has been signalled but not yet waited for.
///
/// Produced by [`CaptureSession::request_stop`] so the wait can happen
/// outside whatever lock guards the session.
#[must_use]
pub struct PendingStop {
    name: String,
    was_running: bool,
    thread: Option<Arc<GracefulThread>>,
}

impl PendingStop {
    /// Waits up to `grace` for the capture loop to exit.
    pub fn wait(self, grace: Duration) -> StopOutcome {
        let outcome = match &self.thread {
            Some(thread) => thread.join_within(grace),
            None => StopOutcome::Stopped,
        };
        if self.was_running {
            match outcome {
                StopOutcome::Stopped => log::info!("Stopped camera stream: {}", self.name),
                StopOutcome::Lingering => log::warn!(
                    "Camera {} stop requested; capture loop still inside a blocking read",
                    self.name
                ),
            }
        }
        outcome
    }
}

impl CaptureSession {
    pub fn new(
        camera_id: CameraId,
        name: impl Into<String>,
        source: SourceLocator,
        config: SessionConfig,
        capture: Arc<dyn CaptureSource>,
        store: Arc<dyn SurveillanceStore>,
    ) -> Self {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(config.queue_capacity.max(1));
        Self {
            camera_id,
            name: name.into(),
            source,
            config,
            capture,
            store,
            shared: Arc::new(SessionShared {
                health: Mutex::new(Health {
                    state: ConnectionState::Disconnected,
                    fps: 0.0,
                    error_count: 0,
                    last_error: None,
                }),
                latest_frame: Mutex::new(None),
            }),
            running: Arc::new(AtomicBool::new(false)),
            frame_tx,
            frame_rx,
            stop_tx: None,
            thread: None,
        }
    }

    pub fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the capture loop. Starting a running session is a no-op.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.is_running() {
            log::warn!("Camera {} is already running", self.name);
            return Ok(());
        }
        if !self.loop_exited() {
            return Err(SessionError::PreviousLoopActive(self.camera_id));
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join_within(Duration::ZERO);
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        self.running.store(true, Ordering::SeqCst);

        let capture_loop = CaptureLoop {
            camera_id: self.camera_id,
            name: self.name.clone(),
            source: self.source.clone(),
            config: self.config.clone(),
            capture: self.capture.clone(),
            store: self.store.clone(),
            shared: self.shared.clone(),
            running: self.running.clone(),
            frame_tx: self.frame_tx.clone(),
            stop_rx,
            reported: None,
            sequence: 0,
            fps: FpsEstimator::new(Instant::now()),
        };

        match GracefulThread::spawn(format!("capture-{}", self.camera_id), move || {
            capture_loop.run()
        }) {
            Ok(thread) => {
                self.thread = Some(Arc::new(thread));
                self.stop_tx = Some(stop_tx);
                log::info!("Started camera stream: {}", self.name);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(SessionError::Spawn(e))
            }
        }
    }

    /// Signals the loop to exit without waiting for it.
    ///
    /// `status().running` is false once this returns.
    pub fn request_stop(&mut self) -> PendingStop {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        // Dropping the sender wakes the loop out of any reconnect/retry wait.
        self.stop_tx = None;
        if was_running {
            report_status(&*self.store, self.camera_id, CameraStatus::Inactive);
        }
        PendingStop {
            name: self.name.clone(),
            was_running,
            thread: self.thread.clone(),
        }
    }

    /// Signals the loop to exit and waits up to the configured grace period.
    ///
    /// `status().running` is false once this returns, whatever the outcome.
    pub fn stop(&mut self) -> StopOutcome {
        let outcome = self.request_stop().wait(self.config.stop_grace);
        if outcome == StopOutcome::Stopped {
            self.thread = None;
        }
        outcome
    }

    /// True when no capture loop of this session is alive, including one
    /// still finishing a read after a stop.
    pub fn loop_exited(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Copy of the most recently decoded frame.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.shared
            .latest_frame
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn status(&self) -> SessionStatus {
        let health = self.shared.health();
        SessionStatus {
            camera_id: self.camera_id,
            name: self.name.clone(),
            source: self.source.clone(),
            running: self.is_running(),
            state: health.state,
            fps: (health.fps * 100.0).round() / 100.0,
            queue_depth: self.frame_rx.len(),
            error_count: health.error_count,
            last_error: health.last_error.clone(),
        }
    }

    /// A consumer end of this session's frame queue.
    pub fn frame_queue(&self) -> Receiver<FrameSample> {
        self.frame_rx.clone()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

/// Frames counted since the last one-second mark.
struct FpsEstimator {
    window_start: Instant,
    frames: u32,
    fps: f64,
}

impl FpsEstimator {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
            fps: 0.0,
        }
    }

    /// Counts one frame at `now`; returns the current estimate.
    fn record(&mut self, now: Instant) -> f64 {
        self.frames += 1;
        let elapsed = now.duration_since(self.window_start).as_secs_f64();
        if elapsed >= FPS_WINDOW_SECS {
            self.fps = self.frames as f64 / elapsed;
            self.frames = 0;
            self.window_start = now;
        }
        self.fps
    }
}

struct CaptureLoop {
    camera_id: CameraId,
    name: String,
    source: SourceLocator,
    config: SessionConfig,
    capture: Arc<dyn CaptureSource>,
    store: Arc<dyn SurveillanceStore>,
    shared: Arc<SessionShared>,
    running: Arc<AtomicBool>,
    frame_tx: Sender<FrameSample>,
    stop_rx: Receiver<()>,
    reported: Option<CameraStatus>,
    sequence: usize,
    fps: FpsEstimator,
}

impl CaptureLoop {
    fn run(mut self) {
        let mut handle: Option<Box<dyn CaptureHandle>> = None;

        while self.running.load(Ordering::SeqCst) {
            let Some(open) = handle.as_mut() else {
                handle = self.connect();
                if handle.is_none() && !self.pause(self.config.reconnect_delay) {
                    break;
                }
                continue;
            };

            match open.read() {
                Ok(frame) => self.on_frame(frame),
                Err(e) => {
                    let failures = self.on_read_failure(&e.to_string());
                    if failures >= self.config.error_threshold {
                        log::warn!(
                            "Too many read errors for {} ({failures}), reconnecting",
                            self.name
                        );
                        if let Some(mut dropped) = handle.take() {
                            dropped.release();
                        }
                        self.set_state(ConnectionState::Error);
                        self.report(CameraStatus::Error);
                        self.set_state(ConnectionState::Disconnected);
                        if !self.pause(self.config.reconnect_delay) {
                            break;
                        }
                    } else if !self.pause(self.config.read_retry_delay) {
                        break;
                    }
                }
            }
        }

        if let Some(mut open) = handle.take() {
            open.release();
        }
        self.set_state(ConnectionState::Disconnected);
        log::debug!("Capture loop for {} exited", self.name);
    }

    fn connect(&mut self) -> Option<Box<dyn CaptureHandle>> {
        self.set_state(ConnectionState::Connecting);
        log::info!("Connecting to {} at {}", self.name, self.source);

        match self.capture.open(&self.source) {
            Ok(handle) => {
                {
                    let mut health = self.shared.health();
                    health.state = ConnectionState::Connected;
                    health.error_count = 0;
                }
                log::info!("Connected to {}", self.name);
                self.report(CameraStatus::Active);
                Some(handle)
            }
            Err(e) => {
                log::error!("Failed to open camera {}: {e}", self.name);
                {
                    let mut health = self.shared.health();
                    health.state = ConnectionState::Disconnected;
                    health.last_error = Some(e.to_string());
                }
                self.report(CameraStatus::Error);
                None
            }
        }
    }

    fn on_frame(&mut self, frame: Frame) {
        let fps = self.fps.record(Instant::now());
        {
            let mut health = self.shared.health();
            health.error_count = 0;
            health.fps = fps;
        }

        let frame = frame.with_index(self.sequence);
        self.sequence += 1;

        *self
            .shared
            .latest_frame
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(frame.clone());

        let sample = FrameSample {
            camera_id: self.camera_id,
            camera_name: self.name.clone(),
            timestamp: SystemTime::now(),
            frame,
        };
        if let Err(TrySendError::Full(_)) = self.frame_tx.try_send(sample) {
            log::trace!("Frame queue full for {}, dropping frame", self.name);
        }
    }

    fn on_read_failure(&self, message: &str) -> u32 {
        log::debug!("Failed to read frame from {}: {message}", self.name);
        let mut health = self.shared.health();
        health.error_count += 1;
        health.last_error = Some(format!("Failed to read frame: {message}"));
        health.error_count
    }

    /// Reports `status` unless it is the one reported last.
    fn report(&mut self, status: CameraStatus) {
        if self.reported != Some(status) {
            report_status(&*self.store, self.camera_id, status);
            self.reported = Some(status);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.shared.health().state = state;
    }

    /// Sleeps for `delay` unless stopped first. Returns `false` when stopped.
    fn pause(&self, delay: Duration) -> bool {
        match self.stop_rx.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => self.running.load(Ordering::SeqCst),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

fn report_status(store: &dyn SurveillanceStore, camera_id: CameraId, status: CameraStatus) {
    if let Err(e) = store.update_camera_status(camera_id, status) {
        log::warn!("Failed to record status {status} for camera {camera_id}: {e}");
    }
}
