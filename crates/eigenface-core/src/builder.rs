//! Face-space training via principal component analysis ("eigenfaces").
//!
//! Works on the `faces × faces` covariance surrogate `A·Aᵗ` instead of the
//! full `pixels × pixels` covariance: both share their non-zero eigenvalues,
//! and an eigenvector `v` of the surrogate maps to a pixel-space eigenface
//! through `vᵗ·A`.

use crate::face_space::FaceSpace;
use crate::linalg::{DenseBackend, LinalgError, LinearAlgebra};
use crate::types::TrainingSet;
use ndarray::{s, Array2, ArrayViewMut1, Axis};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("invalid training set: {0}")]
    InvalidTrainingSet(String),
    #[error("eigenface {component} has no positive maximum; training data has a zero-variance direction")]
    DegenerateBasis { component: usize },
    #[error("linear algebra: {0}")]
    Linalg(#[from] LinalgError),
}

/// Turns a [`TrainingSet`] into a [`FaceSpace`].
#[derive(Debug, Clone, Default)]
pub struct FaceSpaceBuilder<L = DenseBackend> {
    backend: L,
}

impl FaceSpaceBuilder<DenseBackend> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<L: LinearAlgebra> FaceSpaceBuilder<L> {
    pub fn with_backend(backend: L) -> Self {
        Self { backend }
    }

    /// Train a face space. Consumes the training set; its pixel buffer becomes
    /// the mean-removed face matrix.
    pub fn build(&self, set: TrainingSet) -> Result<FaceSpace, BuildError> {
        let pixels = validate(&set)?;
        let TrainingSet {
            faces,
            identifiers,
            width,
            height,
            components,
        } = set;
        let nrfaces = faces.len();

        tracing::info!(faces = nrfaces, pixels, components, "building face space");

        let flat: Vec<f64> = faces.into_iter().flatten().collect();
        let mut centered = Array2::from_shape_vec((nrfaces, pixels), flat)
            .map_err(|e| BuildError::InvalidTrainingSet(format!("face matrix: {e}")))?;

        let mean_face = centered
            .mean_axis(Axis(0))
            .ok_or_else(|| BuildError::InvalidTrainingSet("training set is empty".into()))?;
        centered -= &mean_face;

        // Surrogate covariance L = A·Aᵗ (faces × faces).
        let transposed = self.backend.transpose(centered.view());
        let covariance = self.backend.multiply(centered.view(), transposed.view())?;

        let eigen = self.backend.symmetric_eigen(covariance.view())?.sorted_descending();
        tracing::debug!(eigenvalues = ?eigen.values.to_vec(), "covariance surrogate spectrum");

        // Top eigenvectors as rows of V, then eigenfaces = V·A.
        let top = self.backend.transpose(eigen.vectors.slice(s![.., ..components]));
        let mut basis = self.backend.multiply(top.view(), centered.view())?;
        for (component, row) in basis.outer_iter_mut().enumerate() {
            normalize_eigenface(row, component)?;
        }

        // weights[i][j] = |eigenface_j · face_i|
        let basis_t = self.backend.transpose(basis.view());
        let weights = self
            .backend
            .multiply(centered.view(), basis_t.view())?
            .mapv(f64::abs);

        let eigenvalues = eigen.values.slice(s![..components]).to_owned();

        Ok(FaceSpace::assemble(
            width,
            height,
            mean_face,
            basis,
            weights,
            eigenvalues,
            identifiers,
        ))
    }
}

/// Check the training set's shape; returns the pixel count per face.
fn validate(set: &TrainingSet) -> Result<usize, BuildError> {
    let invalid = |msg: String| Err(BuildError::InvalidTrainingSet(msg));

    let nrfaces = set.faces.len();
    if nrfaces == 0 {
        return invalid("training set is empty".into());
    }
    if set.width == 0 || set.height == 0 {
        return invalid(format!("image dimensions {}x{} are empty", set.width, set.height));
    }
    let Some(pixels) = set.width.checked_mul(set.height) else {
        return invalid(format!("image dimensions {}x{} overflow", set.width, set.height));
    };
    if set.identifiers.len() != nrfaces {
        return invalid(format!(
            "{} identifiers supplied for {nrfaces} faces",
            set.identifiers.len()
        ));
    }
    if set.components < 1 || set.components > nrfaces {
        return invalid(format!(
            "component count {} outside [1, {nrfaces}]",
            set.components
        ));
    }
    for (i, face) in set.faces.iter().enumerate() {
        if face.len() != pixels {
            return invalid(format!(
                "face {i} ({}) has {} pixels, expected {pixels}",
                set.identifiers[i],
                face.len()
            ));
        }
        if face.iter().any(|p| !p.is_finite()) {
            return invalid(format!("face {i} ({}) has non-finite pixels", set.identifiers[i]));
        }
    }

    Ok(pixels)
}

/// Scale an eigenface into `[0, 1]`: divide by its maximum, then take
/// absolute values.
///
/// Eigenvectors are sign-ambiguous, so the row is first oriented with its
/// largest-magnitude component positive; the maximum is then also the
/// largest absolute value.
fn normalize_eigenface(mut row: ArrayViewMut1<'_, f64>, component: usize) -> Result<(), BuildError> {
    let peak = row
        .iter()
        .copied()
        .fold(0.0f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
    if peak < 0.0 {
        row.mapv_inplace(|x| -x);
    }

    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == 0.0 || !max.is_finite() {
        return Err(BuildError::DegenerateBasis { component });
    }

    row.mapv_inplace(|x| (x / max).abs());
    Ok(())
}
