use crate::detection::domain::face_matcher::{FaceMatcher, MatchOutcome};
use crate::shared::feature_vector::FeatureVector;

/// Nearest-neighbour matching by euclidean distance.
#[derive(Clone, Copy, Debug, Default)]
pub struct EuclideanFaceMatcher;

impl EuclideanFaceMatcher {
    pub fn new() -> Self {
        Self
    }
}

impl FaceMatcher for EuclideanFaceMatcher {
    fn best_match(
        &self,
        known: &[FeatureVector],
        candidate: &FeatureVector,
        tolerance: f64,
    ) -> MatchOutcome {
        let mut best: Option<(usize, f64)> = None;
        for (i, vector) in known.iter().enumerate() {
            let distance = vector.euclidean_distance(candidate);
            // Strict comparison keeps the first of several equal distances.
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }
        match best {
            Some((index, distance)) if distance < tolerance => MatchOutcome {
                index: Some(index),
                distance,
            },
            Some((_, distance)) => MatchOutcome::no_match(distance),
            None => MatchOutcome::no_match(f64::INFINITY),
        }
    }
}
