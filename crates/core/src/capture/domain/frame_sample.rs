use std::time::SystemTime;

use crate::shared::camera_id::CameraId;
use crate::shared::frame::Frame;

/// One captured frame in flight between a capture session and a worker.
///
/// Moved, never shared: whichever queue or consumer holds it owns it.
#[derive(Debug)]
pub struct FrameSample {
    pub camera_id: CameraId,
    pub camera_name: String,
    pub timestamp: SystemTime,
    pub frame: Frame,
}
