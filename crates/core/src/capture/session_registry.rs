use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::alerting::domain::surveillance_store::SurveillanceStore;
use crate::capture::capture_session::{
    CaptureSession, PendingStop, SessionConfig, SessionError, SessionStatus,
};
use crate::capture::domain::capture_source::CaptureSource;
use crate::capture::domain::frame_queue_source::FrameQueueSource;
use crate::capture::domain::frame_sample::FrameSample;
use crate::capture::domain::source_locator::SourceLocator;
use crate::config::CameraConfig;
use crate::shared::camera_id::CameraId;
use crate::shared::frame::Frame;
use crate::shared::graceful_thread::StopOutcome;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("camera {0} is already registered")]
    Conflict(CameraId),
    #[error("camera {0} is not registered")]
    NotFound(CameraId),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Registered sessions plus removed ones whose capture loop has not exited.
/// A retiring id cannot be registered again until its loop is gone.
#[derive(Default)]
struct Entries {
    live: BTreeMap<CameraId, CaptureSession>,
    retiring: BTreeMap<CameraId, CaptureSession>,
}

impl Entries {
    fn live_mut(&mut self, camera_id: CameraId) -> Result<&mut CaptureSession, RegistryError> {
        self.live
            .get_mut(&camera_id)
            .ok_or(RegistryError::NotFound(camera_id))
    }

    fn prune_retiring(&mut self) {
        self.retiring.retain(|camera_id, session| {
            let exited = session.loop_exited();
            if exited {
                log::debug!("Capture loop for removed camera {camera_id} has exited");
            }
            !exited
        });
    }
}

/// All capture sessions, keyed by camera id.
///
/// Every mutation goes through one registry-wide lock, but nothing waits
/// for a capture loop while holding it: stops are signalled under the lock
/// and joined after it is released. Per-session state has its own locks, so
/// status reads do not wait on capture reads.
pub struct SessionRegistry {
    capture: Arc<dyn CaptureSource>,
    store: Arc<dyn SurveillanceStore>,
    config: SessionConfig,
    entries: Mutex<Entries>,
}

impl SessionRegistry {
    pub fn new(
        capture: Arc<dyn CaptureSource>,
        store: Arc<dyn SurveillanceStore>,
        config: SessionConfig,
    ) -> Self {
        Self {
            capture,
            store,
            config,
            entries: Mutex::new(Entries::default()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(
        &self,
        camera_id: CameraId,
        name: impl Into<String>,
        source: SourceLocator,
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries();
        entries.prune_retiring();
        if entries.live.contains_key(&camera_id) {
            log::warn!("Camera {camera_id} already exists");
            return Err(RegistryError::Conflict(camera_id));
        }
        if entries.retiring.contains_key(&camera_id) {
            log::warn!("Camera {camera_id} is still being removed");
            return Err(RegistryError::Conflict(camera_id));
        }
        let session = CaptureSession::new(
            camera_id,
            name,
            source,
            self.config.clone(),
            self.capture.clone(),
            self.store.clone(),
        );
        log::info!("Added camera: {} (ID: {camera_id})", session.name());
        entries.live.insert(camera_id, session);
        Ok(())
    }

    /// Registers every configured camera; returns how many were added.
    pub fn load(&self, cameras: &[CameraConfig]) -> usize {
        let added = cameras
            .iter()
            .filter(|c| self.add(c.id, c.name.clone(), c.source.clone()).is_ok())
            .count();
        log::info!("Loaded {added} cameras from configuration");
        added
    }

    /// Stops the session and deletes it.
    ///
    /// The camera disappears from the registry at once. On
    /// [`StopOutcome::Lingering`] its id stays reserved until the old loop
    /// exits, so `add` with that id fails with a conflict until then.
    pub fn remove(&self, camera_id: CameraId) -> Result<StopOutcome, RegistryError> {
        let pending = {
            let mut entries = self.entries();
            let mut session = entries
                .live
                .remove(&camera_id)
                .ok_or(RegistryError::NotFound(camera_id))?;
            let pending = session.request_stop();
            entries.retiring.insert(camera_id, session);
            pending
        };

        let outcome = pending.wait(self.config.stop_grace);
        match outcome {
            StopOutcome::Stopped => {
                if let Some(session) = self.entries().retiring.remove(&camera_id) {
                    log::info!("Removed camera: {} (ID: {camera_id})", session.name());
                }
            }
            StopOutcome::Lingering => log::warn!(
                "Camera {camera_id} removed; its id is reserved until the capture loop exits"
            ),
        }
        Ok(outcome)
    }

    pub fn start(&self, camera_id: CameraId) -> Result<(), RegistryError> {
        self.entries().live_mut(camera_id)?.start()?;
        Ok(())
    }

    pub fn stop(&self, camera_id: CameraId) -> Result<StopOutcome, RegistryError> {
        let pending = self.entries().live_mut(camera_id)?.request_stop();
        Ok(pending.wait(self.config.stop_grace))
    }

    /// Starts every idle session. A session that fails to start is logged
    /// and skipped; the others still start.
    pub fn start_all(&self) {
        let mut entries = self.entries();
        for session in entries.live.values_mut().filter(|s| !s.is_running()) {
            if let Err(e) = session.start() {
                log::error!("Failed to start camera {}: {e}", session.name());
            }
        }
        log::info!("Started all cameras");
    }

    /// Stops every session; returns the cameras whose loops are still exiting.
    ///
    /// All sessions are signalled first and then share one grace period.
    pub fn stop_all(&self) -> Vec<CameraId> {
        let pending: Vec<(CameraId, PendingStop)> = self
            .entries()
            .live
            .iter_mut()
            .map(|(id, session)| (*id, session.request_stop()))
            .collect();

        let deadline = Instant::now() + self.config.stop_grace;
        let lingering = pending
            .into_iter()
            .filter_map(|(id, stop)| {
                let remaining = deadline.saturating_duration_since(Instant::now());
                (stop.wait(remaining) == StopOutcome::Lingering).then_some(id)
            })
            .collect();
        log::info!("Stopped all cameras");
        lingering
    }

    /// Status of every session, ordered by camera id.
    pub fn list_statuses(&self) -> Vec<SessionStatus> {
        self.entries()
            .live
            .values()
            .map(CaptureSession::status)
            .collect()
    }

    pub fn status(&self, camera_id: CameraId) -> Option<SessionStatus> {
        self.entries().live.get(&camera_id).map(CaptureSession::status)
    }

    pub fn latest_frame(&self, camera_id: CameraId) -> Option<Frame> {
        self.entries()
            .live
            .get(&camera_id)
            .and_then(CaptureSession::latest_frame)
    }

    pub fn len(&self) -> usize {
        self.entries().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().live.is_empty()
    }
}

impl FrameQueueSource for SessionRegistry {
    fn running_queues(&self) -> Vec<Receiver<FrameSample>> {
        self.entries()
            .live
            .values()
            .filter(|s| s.is_running())
            .map(CaptureSession::frame_queue)
            .collect()
    }
}
