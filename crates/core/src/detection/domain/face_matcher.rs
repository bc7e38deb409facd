use crate::shared::feature_vector::FeatureVector;

/// Result of comparing one candidate against the known set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchOutcome {
    /// Index into the known set of the accepted match, if any.
    pub index: Option<usize>,
    /// Distance to the closest known vector (infinite for an empty set).
    pub distance: f64,
}

impl MatchOutcome {
    pub fn no_match(distance: f64) -> Self {
        Self {
            index: None,
            distance,
        }
    }
}

pub trait FaceMatcher: Send + Sync {
    /// Finds the closest known vector. A match is reported only when its
    /// distance is strictly below `tolerance`.
    fn best_match(
        &self,
        known: &[FeatureVector],
        candidate: &FeatureVector,
        tolerance: f64,
    ) -> MatchOutcome;
}
