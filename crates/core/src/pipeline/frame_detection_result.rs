use std::time::SystemTime;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::camera_id::CameraId;
use crate::shared::constants::UNKNOWN_NAME;
use crate::shared::feature_vector::FeatureVector;
use crate::shared::frame::Frame;

/// One face found in a sampled frame, already resolved against the known set.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub features: FeatureVector,
    /// Matched person, or "Unknown".
    pub name: String,
    pub confidence: f64,
}

impl FaceDetection {
    pub fn is_known(&self) -> bool {
        self.name != UNKNOWN_NAME
    }
}

/// Everything a worker learned about one frame. Results for different
/// frames, even from the same camera, arrive in no particular order.
#[derive(Clone, Debug)]
pub struct FrameDetectionResult {
    pub camera_id: CameraId,
    pub camera_name: String,
    pub timestamp: SystemTime,
    pub frame: Frame,
    pub faces: Vec<FaceDetection>,
}
