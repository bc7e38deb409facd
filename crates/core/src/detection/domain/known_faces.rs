use std::collections::HashSet;

use crate::detection::domain::face_matcher::FaceMatcher;
use crate::shared::constants::UNKNOWN_NAME;
use crate::shared::feature_vector::FeatureVector;

/// Name and confidence resolved for one detected face.
#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    pub name: String,
    pub confidence: f64,
}

impl Identity {
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN_NAME.to_string(),
            confidence: 0.0,
        }
    }

    pub fn is_known(&self) -> bool {
        self.name != UNKNOWN_NAME
    }
}

/// Flat, ordered list of (name, feature vector) pairs.
///
/// A person may appear several times, once per enrolled vector. Order
/// matters: equal distances resolve to the earliest entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KnownFaces {
    names: Vec<String>,
    vectors: Vec<FeatureVector>,
}

impl KnownFaces {
    pub fn new(entries: Vec<(String, FeatureVector)>) -> Self {
        let (names, vectors) = entries.into_iter().unzip();
        Self { names, vectors }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Total number of feature vectors.
    pub fn encoding_count(&self) -> usize {
        self.vectors.len()
    }

    /// Number of distinct people.
    pub fn people_count(&self) -> usize {
        self.names.iter().collect::<HashSet<_>>().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Resolves `candidate` to a known name, or "Unknown" when nothing lies
    /// strictly within `tolerance`. Confidence is `1 - distance` for a match.
    pub fn identify(
        &self,
        matcher: &dyn FaceMatcher,
        candidate: &FeatureVector,
        tolerance: f64,
    ) -> Identity {
        let outcome = matcher.best_match(&self.vectors, candidate, tolerance);
        match outcome.index.and_then(|i| self.name(i)) {
            Some(name) => Identity {
                name: name.to_string(),
                confidence: 1.0 - outcome.distance,
            },
            None => Identity::unknown(),
        }
    }
}
