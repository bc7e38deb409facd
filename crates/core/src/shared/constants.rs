pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Components per face feature vector.
pub const FEATURE_VECTOR_LEN: usize = 128;

/// Name reported for faces that match no known identity.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Consecutive failed reads that force a full reconnect.
pub const DEFAULT_ERROR_THRESHOLD: u32 = 10;

/// Window over which a session's FPS estimate is computed.
pub const FPS_WINDOW_SECS: f64 = 1.0;
