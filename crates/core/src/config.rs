use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alerting::domain::surveillance_store::WatchlistEntry;
use crate::capture::domain::source_locator::SourceLocator;
use crate::shared::camera_id::CameraId;
use crate::shared::constants::DEFAULT_ERROR_THRESHOLD;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Detector input resolution preset handed to the detection capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionModel {
    #[default]
    Fast,
    Accurate,
}

impl DetectionModel {
    pub fn input_size(self) -> u32 {
        match self {
            DetectionModel::Fast => 320,
            DetectionModel::Accurate => 640,
        }
    }
}

impl std::str::FromStr for DetectionModel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(DetectionModel::Fast),
            "accurate" => Ok(DetectionModel::Accurate),
            other => Err(ConfigError::Invalid(format!(
                "unknown detection model '{other}' (expected fast or accurate)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: CameraId,
    pub name: String,
    pub source: SourceLocator,
}

/// Every tunable of the watch pipeline. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub workers: usize,
    pub sample_interval: u64,
    pub camera_queue_capacity: usize,
    pub detection_queue_capacity: usize,
    pub results_queue_capacity: usize,
    pub detection_scale: f64,
    pub detection_model: DetectionModel,
    pub match_tolerance: f64,
    pub reconnect_delay_ms: u64,
    pub read_retry_delay_ms: u64,
    pub read_timeout_ms: u64,
    pub error_threshold: u32,
    pub alert_cooldown_secs: u64,
    pub save_snapshots: bool,
    pub snapshot_dir: PathBuf,
    pub snapshot_padding: i32,
    pub known_faces_path: PathBuf,
    pub stop_grace_ms: u64,
    pub worker_poll_ms: u64,
    pub collector_wait_ms: u64,
    pub cameras: Vec<CameraConfig>,
    pub watchlist: Vec<WatchlistEntry>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            sample_interval: 2,
            camera_queue_capacity: 100,
            detection_queue_capacity: 500,
            results_queue_capacity: 64,
            detection_scale: 0.5,
            detection_model: DetectionModel::Fast,
            match_tolerance: 0.5,
            reconnect_delay_ms: 5000,
            read_retry_delay_ms: 100,
            read_timeout_ms: 5000,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            alert_cooldown_secs: 30,
            save_snapshots: true,
            snapshot_dir: PathBuf::from("alerts"),
            snapshot_padding: 20,
            known_faces_path: PathBuf::from("known_encodings.json"),
            stop_grace_ms: 2000,
            worker_poll_ms: 1000,
            collector_wait_ms: 50,
            cameras: Vec::new(),
            watchlist: Vec::new(),
        }
    }
}

impl WatchConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: WatchConfig =
            serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.workers == 0 {
            return invalid("workers must be at least 1");
        }
        if self.sample_interval == 0 {
            return invalid("sample_interval must be at least 1");
        }
        if self.camera_queue_capacity == 0
            || self.detection_queue_capacity == 0
            || self.results_queue_capacity == 0
        {
            return invalid("queue capacities must be at least 1");
        }
        if !(self.detection_scale > 0.0 && self.detection_scale <= 1.0) {
            return invalid("detection_scale must be in (0, 1]");
        }
        if !(self.match_tolerance > 0.0) {
            return invalid("match_tolerance must be positive");
        }
        if self.error_threshold == 0 {
            return invalid("error_threshold must be at least 1");
        }
        if self.worker_poll_ms == 0 || self.collector_wait_ms == 0 {
            return invalid("worker_poll_ms and collector_wait_ms must be at least 1");
        }
        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if !seen.insert(camera.id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate camera id {}",
                    camera.id
                )));
            }
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn worker_poll(&self) -> Duration {
        Duration::from_millis(self.worker_poll_ms)
    }

    pub fn collector_wait(&self) -> Duration {
        Duration::from_millis(self.collector_wait_ms)
    }
}
