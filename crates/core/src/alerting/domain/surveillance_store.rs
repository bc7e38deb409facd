use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::shared::bounding_box::BoundingBox;
use crate::shared::camera_id::CameraId;

/// Camera health as reported to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Active,
    Inactive,
    Error,
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraStatus::Active => write!(f, "active"),
            CameraStatus::Inactive => write!(f, "inactive"),
            CameraStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub person_name: String,
    #[serde(default = "default_threat_level")]
    pub threat_level: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_threat_level() -> String {
    "medium".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub camera_id: CameraId,
    pub person_name: String,
    pub confidence: f64,
    pub snapshot_path: Option<PathBuf>,
    pub bbox: BoundingBox,
    pub timestamp: SystemTime,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertRecord {
    pub camera_id: CameraId,
    pub person_name: String,
    pub threat_level: String,
    pub snapshot_path: Option<PathBuf>,
    pub note: String,
    pub timestamp: SystemTime,
}

/// Persistence for detections, alerts, the watchlist and camera status.
///
/// Called concurrently from capture threads (status) and the alert
/// coordinator, so implementations synchronize internally.
pub trait SurveillanceStore: Send + Sync {
    fn record_detection(&self, record: &DetectionRecord) -> Result<(), Box<dyn std::error::Error>>;

    /// Returns the watchlist entry for `person_name`, if listed.
    fn watchlist_entry(
        &self,
        person_name: &str,
    ) -> Result<Option<WatchlistEntry>, Box<dyn std::error::Error>>;

    fn record_alert(&self, alert: &AlertRecord) -> Result<(), Box<dyn std::error::Error>>;

    fn update_camera_status(
        &self,
        camera_id: CameraId,
        status: CameraStatus,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
