use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raw training faces for a single face space.
///
/// Every face is a flattened `width * height` pixel vector; `identifiers`
/// runs parallel to `faces`. `components` is the number of eigenfaces the
/// builder retains (1 ≤ components ≤ faces).
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub faces: Vec<Vec<f64>>,
    pub identifiers: Vec<String>,
    pub width: usize,
    pub height: usize,
    pub components: usize,
}

impl TrainingSet {
    pub fn new(
        faces: Vec<Vec<f64>>,
        identifiers: Vec<String>,
        width: usize,
        height: usize,
        components: usize,
    ) -> Self {
        Self {
            faces,
            identifiers,
            width,
            height,
            components,
        }
    }

    /// Number of training faces.
    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

/// One fixed-size group of decoded training images, as handed to the registry.
#[derive(Debug, Clone)]
pub struct TrainingGroup {
    pub faces: Vec<Vec<f64>>,
    pub identifiers: Vec<String>,
    pub width: usize,
    pub height: usize,
}

impl TrainingGroup {
    /// Attach the retained component count, yielding a builder input.
    pub fn into_training_set(self, components: usize) -> TrainingSet {
        TrainingSet::new(
            self.faces,
            self.identifiers,
            self.width,
            self.height,
            components,
        )
    }
}

/// Coordinates of a mean-removed query face in a face space's eigenface basis.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryProjection {
    pub values: Array1<f64>,
}

impl QueryProjection {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        self.values.view()
    }
}

/// Nearest training sample for a query within a face space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub identifier: String,
    /// Distance between the query projection and the sample's weight row.
    pub distance: f64,
    /// Row of the matched sample in the face space's weight matrix.
    pub sample: usize,
}

/// Outcome of a registry-wide query.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    /// Index of the face space holding the best match.
    pub space: usize,
    pub best: MatchResult,
    /// False when an acceptance threshold rejected the best match.
    pub accepted: bool,
}

impl Recognition {
    /// Identifier of the accepted match, or `None` for an unknown face.
    pub fn identifier(&self) -> Option<&str> {
        self.accepted.then_some(self.best.identifier.as_str())
    }

    pub fn distance(&self) -> f64 {
        self.best.distance
    }
}

/// Distance between a query projection and a stored weight row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// L2 distance.
    #[default]
    Euclidean,
    /// Sum of per-axis absolute differences.
    Manhattan,
}

impl DistanceMetric {
    pub fn distance(self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        let diffs = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs());
        match self {
            DistanceMetric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            DistanceMetric::Manhattan => diffs.sum(),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Euclidean => f.write_str("euclidean"),
            DistanceMetric::Manhattan => f.write_str("manhattan"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "manhattan" | "l1" => Ok(DistanceMetric::Manhattan),
            other => Err(format!("unknown distance metric: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_euclidean_distance() {
        let a = array![0.0, 3.0];
        let b = array![4.0, 0.0];
        let d = DistanceMetric::Euclidean.distance(a.view(), b.view());
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_manhattan_distance() {
        let a = array![1.0, -2.0, 3.0];
        let b = array![0.0, 2.0, 3.0];
        let d = DistanceMetric::Manhattan.distance(a.view(), b.view());
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_distance_symmetric_and_zero_on_identity() {
        let a = array![1.5, 2.5, 0.25];
        let b = array![0.5, 4.0, 1.0];
        for metric in [DistanceMetric::Euclidean, DistanceMetric::Manhattan] {
            assert_eq!(metric.distance(a.view(), b.view()), metric.distance(b.view(), a.view()));
            assert_eq!(metric.distance(a.view(), a.view()), 0.0);
            assert!(metric.distance(a.view(), b.view()) > 0.0);
        }
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("Euclidean".parse::<DistanceMetric>(), Ok(DistanceMetric::Euclidean));
        assert_eq!("l1".parse::<DistanceMetric>(), Ok(DistanceMetric::Manhattan));
        assert!("cosine".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_rejected_recognition_has_no_identifier() {
        let best = MatchResult { identifier: "alice.png".into(), distance: 9.0, sample: 0 };
        let rejected = Recognition { space: 0, best: best.clone(), accepted: false };
        assert_eq!(rejected.identifier(), None);
        assert_eq!(rejected.distance(), 9.0);

        let accepted = Recognition { space: 0, best, accepted: true };
        assert_eq!(accepted.identifier(), Some("alice.png"));
    }
}
