use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::alerting::domain::cooldown_tracker::{CooldownKey, CooldownTracker};
use crate::alerting::domain::snapshot_writer::SnapshotWriter;
use crate::alerting::domain::surveillance_store::{AlertRecord, DetectionRecord, SurveillanceStore};
use crate::pipeline::frame_detection_result::{FaceDetection, FrameDetectionResult};
use crate::pipeline::pipeline_stats::PipelineCounters;
use crate::shared::graceful_thread::GracefulThread;

/// Turns detection results into detection records and rate-limited alerts.
///
/// Unknown faces are ignored. Every known face is recorded; a watchlisted
/// one raises an alert unless the same person already triggered one on the
/// same camera within the cooldown window. The window is measured on
/// capture timestamps, so late results from a slow worker cannot reopen it.
pub struct AlertCoordinator {
    store: Arc<dyn SurveillanceStore>,
    snapshots: Option<Arc<dyn SnapshotWriter>>,
    cooldown: CooldownTracker,
    counters: Arc<PipelineCounters>,
}

impl AlertCoordinator {
    /// `snapshots` is `None` when snapshot saving is disabled.
    pub fn new(
        store: Arc<dyn SurveillanceStore>,
        snapshots: Option<Arc<dyn SnapshotWriter>>,
        cooldown: Duration,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            store,
            snapshots,
            cooldown: CooldownTracker::new(cooldown),
            counters,
        }
    }

    /// Handles every face of one result; returns the alerts it raised.
    pub fn handle_result(&self, result: &FrameDetectionResult) -> Vec<AlertRecord> {
        result
            .faces
            .iter()
            .filter(|face| face.is_known())
            .filter_map(|face| self.handle_face(result, face))
            .collect()
    }

    fn handle_face(&self, result: &FrameDetectionResult, face: &FaceDetection) -> Option<AlertRecord> {
        self.counters.known_detected();
        let snapshot_path = self.save_snapshot(result, face);

        let detection = DetectionRecord {
            camera_id: result.camera_id,
            person_name: face.name.clone(),
            confidence: face.confidence,
            snapshot_path: snapshot_path.clone(),
            bbox: face.bbox,
            timestamp: result.timestamp,
        };
        if let Err(e) = self.store.record_detection(&detection) {
            log::error!("Failed to record detection of {}: {e}", face.name);
        }

        let entry = match self.store.watchlist_entry(&face.name) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                log::error!("Watchlist lookup for {} failed: {e}", face.name);
                return None;
            }
        };

        let key = CooldownKey::new(result.camera_id, face.name.as_str());
        let Some(grant) = self.cooldown.try_acquire(&key, result.timestamp) else {
            self.counters.alert_suppressed();
            log::debug!(
                "Alert for {} on {} suppressed by cooldown",
                face.name,
                result.camera_name
            );
            return None;
        };

        let alert = AlertRecord {
            camera_id: result.camera_id,
            person_name: face.name.clone(),
            threat_level: entry.threat_level,
            snapshot_path,
            note: format!(
                "Detected on {} with {:.2}% confidence",
                result.camera_name,
                face.confidence * 100.0
            ),
            timestamp: result.timestamp,
        };
        if let Err(e) = self.store.record_alert(&alert) {
            log::error!("Failed to record alert for {}: {e}", face.name);
            self.cooldown.release(grant);
            return None;
        }
        self.counters.alert_emitted();
        log::warn!(
            "ALERT: {} detected on {} (threat level: {})",
            alert.person_name,
            result.camera_name,
            alert.threat_level
        );
        Some(alert)
    }

    fn save_snapshot(&self, result: &FrameDetectionResult, face: &FaceDetection) -> Option<PathBuf> {
        let writer = self.snapshots.as_ref()?;
        match writer.save_crop(
            &result.frame,
            &face.bbox,
            &result.camera_name,
            &face.name,
            result.timestamp,
        ) {
            Ok(path) => Some(path),
            Err(e) => {
                self.counters.snapshot_failed();
                log::error!("Failed to save snapshot of {}: {e}", face.name);
                None
            }
        }
    }

    /// Consumes results until every sender is gone.
    pub fn run(&self, results: Receiver<FrameDetectionResult>) {
        log::info!("Alert coordinator started");
        for result in results {
            self.handle_result(&result);
        }
        log::info!("Alert coordinator stopped");
    }

    pub fn spawn(
        self: Arc<Self>,
        results: Receiver<FrameDetectionResult>,
    ) -> std::io::Result<GracefulThread> {
        GracefulThread::spawn("alert-coordinator", move || self.run(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::domain::surveillance_store::{CameraStatus, WatchlistEntry};
    use crate::alerting::infrastructure::in_memory_store::InMemoryStore;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::camera_id::CameraId;
    use crate::shared::constants::{FEATURE_VECTOR_LEN, UNKNOWN_NAME};
    use crate::shared::feature_vector::FeatureVector;
    use crate::shared::frame::Frame;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Barrier;
    use std::time::{SystemTime, UNIX_EPOCH};

    struct FailingSnapshots;

    impl SnapshotWriter for FailingSnapshots {
        fn save_crop(
            &self,
            _: &Frame,
            _: &BoundingBox,
            _: &str,
            _: &str,
            _: SystemTime,
        ) -> Result<PathBuf, Box<dyn std::error::Error>> {
            Err("disk full".into())
        }
    }

    struct FixedSnapshots;

    impl SnapshotWriter for FixedSnapshots {
        fn save_crop(
            &self,
            _: &Frame,
            _: &BoundingBox,
            camera_name: &str,
            person_name: &str,
            _: SystemTime,
        ) -> Result<PathBuf, Box<dyn std::error::Error>> {
            Ok(PathBuf::from(format!("{camera_name}_{person_name}.jpg")))
        }
    }

    /// Fails the first alert write, then delegates to an in-memory store.
    struct FirstAlertFails {
        inner: Arc<InMemoryStore>,
        failed: AtomicBool,
    }

    impl SurveillanceStore for FirstAlertFails {
        fn record_detection(
            &self,
            record: &DetectionRecord,
        ) -> Result<(), Box<dyn std::error::Error>> {
            self.inner.record_detection(record)
        }

        fn watchlist_entry(
            &self,
            person_name: &str,
        ) -> Result<Option<WatchlistEntry>, Box<dyn std::error::Error>> {
            self.inner.watchlist_entry(person_name)
        }

        fn record_alert(&self, alert: &AlertRecord) -> Result<(), Box<dyn std::error::Error>> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err("database is locked".into());
            }
            self.inner.record_alert(alert)
        }

        fn update_camera_status(
            &self,
            camera_id: CameraId,
            status: CameraStatus,
        ) -> Result<(), Box<dyn std::error::Error>> {
            self.inner.update_camera_status(camera_id, status)
        }
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    fn face(name: &str) -> FaceDetection {
        FaceDetection {
            bbox: BoundingBox::new(0, 0, 2, 2),
            features: FeatureVector::new(vec![0.0; FEATURE_VECTOR_LEN]).unwrap(),
            name: name.to_string(),
            confidence: 0.7234,
        }
    }

    fn result(camera: u32, secs: u64, faces: Vec<FaceDetection>) -> FrameDetectionResult {
        FrameDetectionResult {
            camera_id: CameraId(camera),
            camera_name: format!("cam-{camera}"),
            timestamp: at(secs),
            frame: Frame::new(vec![0u8; 2 * 2 * 3], 2, 2, 3, 0),
            faces,
        }
    }

    fn setup(
        snapshots: Option<Arc<dyn SnapshotWriter>>,
    ) -> (AlertCoordinator, Arc<InMemoryStore>, Arc<PipelineCounters>) {
        let store = Arc::new(InMemoryStore::new(vec![WatchlistEntry {
            person_name: "mallory".into(),
            threat_level: "high".into(),
            description: None,
        }]));
        let counters = Arc::new(PipelineCounters::default());
        let coordinator = AlertCoordinator::new(
            store.clone(),
            snapshots,
            Duration::from_secs(30),
            counters.clone(),
        );
        (coordinator, store, counters)
    }

    #[test]
    fn test_cooldown_scenario() {
        let (coordinator, store, counters) = setup(None);

        assert_eq!(coordinator.handle_result(&result(1, 0, vec![face("mallory")])).len(), 1);
        assert!(coordinator.handle_result(&result(1, 10, vec![face("mallory")])).is_empty());
        assert_eq!(coordinator.handle_result(&result(2, 5, vec![face("mallory")])).len(), 1);
        assert_eq!(coordinator.handle_result(&result(1, 31, vec![face("mallory")])).len(), 1);

        assert_eq!(store.alerts().len(), 3);
        assert_eq!(store.detections().len(), 4);
        assert_eq!(counters.alerts_suppressed(), 1);
    }

    #[test]
    fn test_failed_alert_write_does_not_start_cooldown() {
        let (_, inner, _) = setup(None);
        let store = Arc::new(FirstAlertFails {
            inner: inner.clone(),
            failed: AtomicBool::new(false),
        });
        let counters = Arc::new(PipelineCounters::default());
        let coordinator =
            AlertCoordinator::new(store, None, Duration::from_secs(30), counters.clone());

        assert!(coordinator.handle_result(&result(1, 0, vec![face("mallory")])).is_empty());
        assert!(inner.alerts().is_empty());

        let alerts = coordinator.handle_result(&result(1, 1, vec![face("mallory")]));
        assert_eq!(alerts.len(), 1);
        assert_eq!(inner.alerts().len(), 1);
        assert_eq!(inner.alerts()[0].timestamp, at(1));
        assert_eq!(counters.alerts_suppressed(), 0);

        assert!(coordinator.handle_result(&result(1, 2, vec![face("mallory")])).is_empty());
        assert_eq!(counters.alerts_suppressed(), 1);
    }

    #[test]
    fn test_alert_carries_threat_level_and_note() {
        let (coordinator, _, _) = setup(None);
        let alerts = coordinator.handle_result(&result(3, 0, vec![face("mallory")]));
        assert_eq!(alerts[0].threat_level, "high");
        assert_eq!(alerts[0].note, "Detected on cam-3 with 72.34% confidence");
        assert_eq!(alerts[0].snapshot_path, None);
    }

    #[test]
    fn test_unknown_faces_are_recorded_nowhere() {
        let (coordinator, store, counters) = setup(Some(Arc::new(FixedSnapshots)));
        let alerts = coordinator.handle_result(&result(1, 0, vec![face(UNKNOWN_NAME)]));
        assert!(alerts.is_empty());
        assert!(store.detections().is_empty());
        assert!(store.alerts().is_empty());
        assert_eq!(counters.known_detections(), 0);
    }

    #[test]
    fn test_known_but_unlisted_face_is_recorded_without_alert() {
        let (coordinator, store, _) = setup(None);
        assert!(coordinator.handle_result(&result(1, 0, vec![face("alice")])).is_empty());
        assert_eq!(store.detections().len(), 1);
        assert!(store.alerts().is_empty());
    }

    #[test]
    fn test_snapshot_path_shared_by_detection_and_alert() {
        let (coordinator, store, _) = setup(Some(Arc::new(FixedSnapshots)));
        let alerts = coordinator.handle_result(&result(1, 0, vec![face("mallory")]));
        let expected = Some(PathBuf::from("cam-1_mallory.jpg"));
        assert_eq!(alerts[0].snapshot_path, expected);
        assert_eq!(store.detections()[0].snapshot_path, expected);
    }

    #[test]
    fn test_snapshot_failure_still_alerts() {
        let (coordinator, store, counters) = setup(Some(Arc::new(FailingSnapshots)));
        let alerts = coordinator.handle_result(&result(1, 0, vec![face("mallory")]));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].snapshot_path, None);
        assert_eq!(store.alerts().len(), 1);
        assert_eq!(counters.snapshot_failures(), 1);
    }

    #[test]
    fn test_concurrent_results_for_same_key_alert_once() {
        let (coordinator, store, _) = setup(None);
        let coordinator = Arc::new(coordinator);
        let threads = 4;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads as u64)
            .map(|i| {
                let coordinator = coordinator.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let r = result(7, i, vec![face("mallory")]);
                    barrier.wait();
                    coordinator.handle_result(&r).len()
                })
            })
            .collect();

        let raised: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(raised, 1);
        assert_eq!(store.alerts().len(), 1);
        assert_eq!(store.detections().len(), threads);
    }

    #[test]
    fn test_run_drains_until_senders_drop() {
        let (coordinator, store, _) = setup(None);
        let (tx, rx) = crossbeam_channel::bounded(4);
        let thread = Arc::new(coordinator).spawn(rx).unwrap();

        tx.send(result(1, 0, vec![face("mallory"), face("alice")])).unwrap();
        tx.send(result(1, 40, vec![face("mallory")])).unwrap();
        drop(tx);

        assert_eq!(
            thread.join_within(Duration::from_secs(2)),
            crate::shared::graceful_thread::StopOutcome::Stopped
        );
        assert_eq!(store.alerts().len(), 2);
        assert_eq!(store.detections().len(), 3);
    }
}
