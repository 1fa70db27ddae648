//! Narrow linear-algebra interface used by the face-space builder.
//!
//! Builder logic only talks to [`LinearAlgebra`]; the default
//! [`DenseBackend`] multiplies with ndarray and hands symmetric
//! eigendecomposition to nalgebra.

use nalgebra::linalg::SymmetricEigen;
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use thiserror::Error;

// Upper bound on implicit QR sweeps; face counts are small.
const EIGEN_MAX_ITERATIONS: usize = 10_000;

#[derive(Error, Debug)]
pub enum LinalgError {
    #[error("matrix is not square: {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("cannot multiply {left_rows}x{left_cols} by {right_rows}x{right_cols}")]
    ShapeMismatch {
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },
    #[error("eigendecomposition did not converge within {0} iterations")]
    NoConvergence(usize),
}

/// Eigenvalues with eigenvector `i` stored in column `i` of `vectors`.
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    pub values: Array1<f64>,
    pub vectors: Array2<f64>,
}

impl EigenDecomposition {
    /// Reorder eigenpairs so eigenvalues are non-increasing, moving each
    /// eigenvector column together with its eigenvalue.
    pub fn sorted_descending(self) -> Self {
        let order = rank_descending(&self.values.to_vec());
        let values = order.iter().map(|&i| self.values[i]).collect();
        let vectors = self.vectors.select(Axis(1), &order);
        Self { values, vectors }
    }
}

/// Matrix primitives the eigenface pipeline needs.
pub trait LinearAlgebra {
    fn multiply(&self, a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Result<Array2<f64>, LinalgError>;

    fn transpose(&self, a: ArrayView2<'_, f64>) -> Array2<f64>;

    /// Eigendecomposition of a symmetric matrix. Ordering of the returned
    /// pairs is backend-defined.
    fn symmetric_eigen(&self, m: ArrayView2<'_, f64>) -> Result<EigenDecomposition, LinalgError>;
}

/// Dense double-precision backend (ndarray + nalgebra).
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseBackend;

impl LinearAlgebra for DenseBackend {
    fn multiply(&self, a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Result<Array2<f64>, LinalgError> {
        if a.ncols() != b.nrows() {
            return Err(LinalgError::ShapeMismatch {
                left_rows: a.nrows(),
                left_cols: a.ncols(),
                right_rows: b.nrows(),
                right_cols: b.ncols(),
            });
        }
        Ok(a.dot(&b))
    }

    fn transpose(&self, a: ArrayView2<'_, f64>) -> Array2<f64> {
        a.t().to_owned()
    }

    fn symmetric_eigen(&self, m: ArrayView2<'_, f64>) -> Result<EigenDecomposition, LinalgError> {
        let (rows, cols) = m.dim();
        if rows != cols {
            return Err(LinalgError::NotSquare { rows, cols });
        }

        let matrix = DMatrix::from_fn(rows, cols, |i, j| m[[i, j]]);
        let eigen = SymmetricEigen::try_new(matrix, f64::EPSILON, EIGEN_MAX_ITERATIONS)
            .ok_or(LinalgError::NoConvergence(EIGEN_MAX_ITERATIONS))?;

        let values = eigen.eigenvalues.iter().copied().collect();
        let vectors = Array2::from_shape_fn((rows, cols), |(i, j)| eigen.eigenvectors[(i, j)]);

        Ok(EigenDecomposition { values, vectors })
    }
}

/// Permutation that sorts `values` in non-increasing order.
///
/// Sorts `(value, original_index)` pairs with a stable sort, so equal
/// eigenvalues keep their original relative order.
pub fn rank_descending(values: &[f64]) -> Vec<usize> {
    let mut paired: Vec<(f64, usize)> = values.iter().copied().zip(0..).collect();
    paired.sort_by(|a, b| b.0.total_cmp(&a.0));
    paired.into_iter().map(|(_, index)| index).collect()
}
