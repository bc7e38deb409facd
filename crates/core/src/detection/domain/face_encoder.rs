use crate::config::DetectionModel;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::feature_vector::FeatureVector;
use crate::shared::frame::Frame;

/// A face found in a frame together with its embedding.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedFace {
    /// Box in the coordinates of the frame passed to [`FaceEncoder::encode`].
    pub bbox: BoundingBox,
    pub features: FeatureVector,
}

/// Detects faces in a frame and computes a feature vector for each one.
///
/// Shared by every detection worker, so implementations take `&self` and
/// synchronize any inference session internally.
pub trait FaceEncoder: Send + Sync {
    /// `scale` shrinks the frame before detection (0.5 halves both sides);
    /// returned boxes are always in original frame coordinates.
    fn encode(
        &self,
        frame: &Frame,
        scale: f64,
        model: DetectionModel,
    ) -> Result<Vec<EncodedFace>, Box<dyn std::error::Error>>;
}
