use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use serde::Serialize;

use crate::alerting::domain::surveillance_store::{
    AlertRecord, CameraStatus, DetectionRecord, SurveillanceStore, WatchlistEntry,
};
use crate::shared::camera_id::CameraId;

pub const DETECTIONS_FILE: &str = "detections.jsonl";
pub const ALERTS_FILE: &str = "alerts.jsonl";
pub const CAMERA_STATUS_FILE: &str = "camera_status.jsonl";

#[derive(Serialize)]
struct StatusLine {
    camera_id: CameraId,
    status: CameraStatus,
    timestamp: SystemTime,
}

/// Appends one JSON object per line to a file, flushed after each record.
struct JsonLinesFile {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesFile {
    fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn append<T: Serialize>(&self, record: &T) -> Result<(), Box<dyn std::error::Error>> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

/// File-backed store: detections, alerts and camera status changes are
/// appended as JSON lines in one directory. The watchlist is fixed at
/// construction.
pub struct JsonLinesStore {
    dir: PathBuf,
    watchlist: HashMap<String, WatchlistEntry>,
    detections: JsonLinesFile,
    alerts: JsonLinesFile,
    statuses: JsonLinesFile,
}

impl JsonLinesStore {
    pub fn open(
        dir: impl Into<PathBuf>,
        watchlist: Vec<WatchlistEntry>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let store = Self {
            detections: JsonLinesFile::open(&dir.join(DETECTIONS_FILE))?,
            alerts: JsonLinesFile::open(&dir.join(ALERTS_FILE))?,
            statuses: JsonLinesFile::open(&dir.join(CAMERA_STATUS_FILE))?,
            watchlist: watchlist
                .into_iter()
                .map(|entry| (entry.person_name.clone(), entry))
                .collect(),
            dir,
        };
        log::info!(
            "Recording to {} ({} watchlist entries)",
            store.dir.display(),
            store.watchlist.len()
        );
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SurveillanceStore for JsonLinesStore {
    fn record_detection(&self, record: &DetectionRecord) -> Result<(), Box<dyn std::error::Error>> {
        self.detections.append(record)
    }

    fn watchlist_entry(
        &self,
        person_name: &str,
    ) -> Result<Option<WatchlistEntry>, Box<dyn std::error::Error>> {
        Ok(self.watchlist.get(person_name).cloned())
    }

    fn record_alert(&self, alert: &AlertRecord) -> Result<(), Box<dyn std::error::Error>> {
        self.alerts.append(alert)
    }

    fn update_camera_status(
        &self,
        camera_id: CameraId,
        status: CameraStatus,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.statuses.append(&StatusLine {
            camera_id,
            status,
            timestamp: SystemTime::now(),
        })
    }
}
