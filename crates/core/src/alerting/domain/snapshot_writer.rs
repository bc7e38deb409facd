use std::path::PathBuf;
use std::time::SystemTime;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Persists a cropped image of a detected face.
pub trait SnapshotWriter: Send + Sync {
    /// Writes the face crop and returns where it was stored.
    fn save_crop(
        &self,
        frame: &Frame,
        bbox: &BoundingBox,
        camera_name: &str,
        person_name: &str,
        timestamp: SystemTime,
    ) -> Result<PathBuf, Box<dyn std::error::Error>>;
}
