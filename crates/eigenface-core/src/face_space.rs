//! A trained face space and its nearest-neighbour matcher.

use crate::types::{DistanceMetric, MatchResult, QueryProjection};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceSpaceError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("incompatible face space: {0}")]
    IncompatibleCache(String),
    #[error("non-finite query pixel at index {index}")]
    NonFiniteQuery { index: usize },
}

/// One trained eigenface subspace.
///
/// Immutable once built; every query method takes `&self` and returns its
/// result by value, so a face space can be shared across threads freely.
/// Deserializing runs [`FaceSpace::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "FaceSpaceParts")]
pub struct FaceSpace {
    width: usize,
    height: usize,
    mean_face: Array1<f64>,
    /// `components × pixels`, one normalized eigenface per row.
    basis: Array2<f64>,
    /// `faces × components`, row `i` is training face `i` in the basis.
    weights: Array2<f64>,
    /// Eigenvalues of the retained eigenfaces, non-increasing.
    eigenvalues: Array1<f64>,
    identifiers: Vec<String>,
}

/// Unvalidated wire form of a [`FaceSpace`].
#[derive(Deserialize)]
struct FaceSpaceParts {
    width: usize,
    height: usize,
    mean_face: Array1<f64>,
    basis: Array2<f64>,
    weights: Array2<f64>,
    eigenvalues: Array1<f64>,
    identifiers: Vec<String>,
}

impl TryFrom<FaceSpaceParts> for FaceSpace {
    type Error = FaceSpaceError;

    fn try_from(parts: FaceSpaceParts) -> Result<Self, Self::Error> {
        Self::from_parts(
            parts.width,
            parts.height,
            parts.mean_face,
            parts.basis,
            parts.weights,
            parts.eigenvalues,
            parts.identifiers,
        )
    }
}

impl FaceSpace {
    /// Used by the builder, whose output satisfies the invariants by construction.
    pub(crate) fn assemble(
        width: usize,
        height: usize,
        mean_face: Array1<f64>,
        basis: Array2<f64>,
        weights: Array2<f64>,
        eigenvalues: Array1<f64>,
        identifiers: Vec<String>,
    ) -> Self {
        Self {
            width,
            height,
            mean_face,
            basis,
            weights,
            eigenvalues,
            identifiers,
        }
    }

    /// Reassemble a face space from stored parts, rejecting structurally
    /// invalid data.
    pub fn from_parts(
        width: usize,
        height: usize,
        mean_face: Array1<f64>,
        basis: Array2<f64>,
        weights: Array2<f64>,
        eigenvalues: Array1<f64>,
        identifiers: Vec<String>,
    ) -> Result<Self, FaceSpaceError> {
        let space = Self::assemble(width, height, mean_face, basis, weights, eigenvalues, identifiers);
        space.validate()?;
        Ok(space)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixels per face (`width * height`).
    pub fn pixels(&self) -> usize {
        self.mean_face.len()
    }

    /// Number of retained eigenfaces.
    pub fn components(&self) -> usize {
        self.basis.nrows()
    }

    /// Number of training faces.
    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn mean_face(&self) -> &Array1<f64> {
        &self.mean_face
    }

    pub fn basis(&self) -> &Array2<f64> {
        &self.basis
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// Project a raw face vector: `|eigenface_j · (query - mean)|` per component.
    pub fn project(&self, query: &[f64]) -> Result<QueryProjection, FaceSpaceError> {
        if query.len() != self.pixels() {
            return Err(FaceSpaceError::DimensionMismatch {
                expected: self.pixels(),
                got: query.len(),
            });
        }
        if let Some(index) = query.iter().position(|p| !p.is_finite()) {
            return Err(FaceSpaceError::NonFiniteQuery { index });
        }

        let centered = &ArrayView1::from(query) - &self.mean_face;
        let values = self.basis.dot(&centered).mapv(f64::abs);
        Ok(QueryProjection { values })
    }

    /// Nearest training face by Euclidean distance.
    pub fn nearest_match(&self, projection: &QueryProjection) -> Result<MatchResult, FaceSpaceError> {
        self.nearest_match_with(projection, DistanceMetric::Euclidean)
    }

    /// Nearest training face under `metric`. Ties go to the lowest row.
    pub fn nearest_match_with(
        &self,
        projection: &QueryProjection,
        metric: DistanceMetric,
    ) -> Result<MatchResult, FaceSpaceError> {
        if projection.len() != self.components() {
            return Err(FaceSpaceError::DimensionMismatch {
                expected: self.components(),
                got: projection.len(),
            });
        }

        let mut best: Option<(usize, f64)> = None;
        for (sample, row) in self.weights.outer_iter().enumerate() {
            let distance = metric.distance(projection.view(), row);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((sample, distance));
            }
        }

        let (sample, distance) = best.ok_or_else(|| {
            FaceSpaceError::IncompatibleCache("face space has no training faces".into())
        })?;
        let identifier = self.identifiers.get(sample).ok_or_else(|| {
            FaceSpaceError::IncompatibleCache(format!("weight row {sample} has no identifier"))
        })?;

        Ok(MatchResult {
            identifier: identifier.clone(),
            distance,
            sample,
        })
    }

    /// Project a raw face and find its nearest training face.
    pub fn match_query(&self, query: &[f64], metric: DistanceMetric) -> Result<MatchResult, FaceSpaceError> {
        let projection = self.project(query)?;
        self.nearest_match_with(&projection, metric)
    }

    /// Check every structural invariant. Run on anything that did not come
    /// straight out of the builder.
    pub fn validate(&self) -> Result<(), FaceSpaceError> {
        let fail = |msg: String| Err(FaceSpaceError::IncompatibleCache(msg));

        let Some(pixels) = self.width.checked_mul(self.height) else {
            return fail(format!("dimensions {}x{} overflow", self.width, self.height));
        };
        if pixels == 0 {
            return fail(format!("dimensions {}x{} are empty", self.width, self.height));
        }
        if self.mean_face.len() != pixels {
            return fail(format!(
                "mean face has {} pixels, expected {pixels}",
                self.mean_face.len()
            ));
        }

        let (components, basis_pixels) = self.basis.dim();
        if components == 0 {
            return fail("basis has no eigenfaces".into());
        }
        if basis_pixels != pixels {
            return fail(format!("eigenfaces have {basis_pixels} pixels, expected {pixels}"));
        }

        let faces = self.identifiers.len();
        if faces == 0 {
            return fail("face space has no training faces".into());
        }
        if components > faces {
            return fail(format!("{components} eigenfaces exceed {faces} training faces"));
        }
        if self.weights.dim() != (faces, components) {
            return fail(format!(
                "weight matrix is {:?}, expected ({faces}, {components})",
                self.weights.dim()
            ));
        }
        if self.eigenvalues.len() != components {
            return fail(format!(
                "{} eigenvalues for {components} eigenfaces",
                self.eigenvalues.len()
            ));
        }

        let non_finite = self
            .mean_face
            .iter()
            .chain(self.basis.iter())
            .chain(self.weights.iter())
            .chain(self.eigenvalues.iter())
            .any(|v| !v.is_finite());
        if non_finite {
            return fail("non-finite values".into());
        }
        if self.eigenvalues.windows(2).into_iter().any(|w| w[0] < w[1]) {
            return fail("eigenvalues are not sorted in non-increasing order".into());
        }
        if self.basis.iter().any(|&x| !(0.0..=1.0).contains(&x)) {
            return fail("eigenface components outside [0, 1]".into());
        }
        if self.weights.iter().any(|&w| w < 0.0) {
            return fail("negative weights".into());
        }

        Ok(())
    }
}
