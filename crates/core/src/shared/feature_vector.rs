use ndarray::ArrayView1;
use thiserror::Error;

use crate::shared::constants::FEATURE_VECTOR_LEN;

#[derive(Error, Debug, PartialEq)]
pub enum FeatureVectorError {
    #[error("feature vector must have 128 components, got {0}")]
    WrongLength(usize),
    #[error("feature vector component {0} is not finite")]
    NonFinite(usize),
}

/// Fixed-length face embedding used for distance-based identity matching.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(components: Vec<f32>) -> Result<Self, FeatureVectorError> {
        if components.len() != FEATURE_VECTOR_LEN {
            return Err(FeatureVectorError::WrongLength(components.len()));
        }
        if let Some(i) = components.iter().position(|c| !c.is_finite()) {
            return Err(FeatureVectorError::NonFinite(i));
        }
        Ok(Self(components))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn euclidean_distance(&self, other: &FeatureVector) -> f64 {
        let a = ArrayView1::from(self.as_slice());
        let b = ArrayView1::from(other.as_slice());
        (&a - &b)
            .iter()
            .map(|d| (*d as f64) * (*d as f64))
            .sum::<f64>()
            .sqrt()
    }
}
