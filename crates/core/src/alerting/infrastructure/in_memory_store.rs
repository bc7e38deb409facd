use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::alerting::domain::surveillance_store::{
    AlertRecord, CameraStatus, DetectionRecord, SurveillanceStore, WatchlistEntry,
};
use crate::shared::camera_id::CameraId;

#[derive(Default)]
struct Records {
    detections: Vec<DetectionRecord>,
    alerts: Vec<AlertRecord>,
    statuses: Vec<(CameraId, CameraStatus)>,
}

/// Keeps every record in memory. Useful for tests and for hosts that
/// consume records directly instead of persisting them.
pub struct InMemoryStore {
    watchlist: HashMap<String, WatchlistEntry>,
    records: Mutex<Records>,
}

impl InMemoryStore {
    pub fn new(watchlist: Vec<WatchlistEntry>) -> Self {
        Self {
            watchlist: watchlist
                .into_iter()
                .map(|entry| (entry.person_name.clone(), entry))
                .collect(),
            records: Mutex::new(Records::default()),
        }
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn detections(&self) -> Vec<DetectionRecord> {
        self.records().detections.clone()
    }

    pub fn alerts(&self) -> Vec<AlertRecord> {
        self.records().alerts.clone()
    }

    /// Every status reported for `camera_id`, oldest first.
    pub fn camera_statuses(&self, camera_id: CameraId) -> Vec<CameraStatus> {
        self.records()
            .statuses
            .iter()
            .filter(|(id, _)| *id == camera_id)
            .map(|(_, status)| *status)
            .collect()
    }
}

impl SurveillanceStore for InMemoryStore {
    fn record_detection(&self, record: &DetectionRecord) -> Result<(), Box<dyn std::error::Error>> {
        self.records().detections.push(record.clone());
        Ok(())
    }

    fn watchlist_entry(
        &self,
        person_name: &str,
    ) -> Result<Option<WatchlistEntry>, Box<dyn std::error::Error>> {
        Ok(self.watchlist.get(person_name).cloned())
    }

    fn record_alert(&self, alert: &AlertRecord) -> Result<(), Box<dyn std::error::Error>> {
        self.records().alerts.push(alert.clone());
        Ok(())
    }

    fn update_camera_status(
        &self,
        camera_id: CameraId,
        status: CameraStatus,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.records().statuses.push((camera_id, status));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bounding_box::BoundingBox;
    use std::time::SystemTime;

    fn entry(name: &str, level: &str) -> WatchlistEntry {
        WatchlistEntry {
            person_name: name.to_string(),
            threat_level: level.to_string(),
            description: None,
        }
    }

    #[test]
    fn test_watchlist_lookup() {
        let store = InMemoryStore::new(vec![entry("mallory", "high")]);
        let found = store.watchlist_entry("mallory").unwrap().unwrap();
        assert_eq!(found.threat_level, "high");
        assert!(store.watchlist_entry("alice").unwrap().is_none());
    }

    #[test]
    fn test_records_are_kept_in_order() {
        let store = InMemoryStore::new(vec![]);
        for name in ["alice", "bob"] {
            store
                .record_detection(&DetectionRecord {
                    camera_id: CameraId(1),
                    person_name: name.to_string(),
                    confidence: 0.8,
                    snapshot_path: None,
                    bbox: BoundingBox::new(0, 0, 10, 10),
                    timestamp: SystemTime::now(),
                })
                .unwrap();
        }
        let names: Vec<String> = store.detections().into_iter().map(|d| d.person_name).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert!(store.alerts().is_empty());
    }

    #[test]
    fn test_camera_statuses_are_per_camera() {
        let store = InMemoryStore::new(vec![]);
        store.update_camera_status(CameraId(1), CameraStatus::Active).unwrap();
        store.update_camera_status(CameraId(2), CameraStatus::Error).unwrap();
        store.update_camera_status(CameraId(1), CameraStatus::Inactive).unwrap();

        assert_eq!(
            store.camera_statuses(CameraId(1)),
            vec![CameraStatus::Active, CameraStatus::Inactive]
        );
        assert_eq!(store.camera_statuses(CameraId(2)), vec![CameraStatus::Error]);
    }
}
