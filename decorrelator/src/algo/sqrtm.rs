//! Principal square root of (numerically) symmetric operators.
//!
//! The operator is symmetrized and eigen-decomposed; the root is
//! `V diag(sqrt(λ)) Vᵀ`. Negative eigenvalues have purely imaginary roots,
//! which are collected in a separate imaginary part instead of being
//! discarded, so callers can judge how far the operator is from positive
//! semi-definite.

use log::warn;
use nalgebra::{DMatrix, DVector, SymmetricEigen};

use super::convolution_matrix::OperatorError;

/// Relative asymmetry above which a warning is logged
const ASYMMETRY_WARNING: f64 = 1e-2;

/// Complex matrix square root split into real and imaginary parts
#[derive(Debug, Clone)]
pub struct MatrixSqrt {
    /// Real part of the root
    pub real: DMatrix<f64>,
    /// Imaginary part, non-zero only where the operator had negative eigenvalues
    pub imaginary: DMatrix<f64>,
    /// max|A - Aᵀ| / max|A| of the input before symmetrization
    pub asymmetry: f64,
}

impl MatrixSqrt {
    /// Real and imaginary parts of one row of the root
    pub fn row(&self, index: usize) -> (DVector<f64>, DVector<f64>) {
        (
            self.real.row(index).transpose(),
            self.imaginary.row(index).transpose(),
        )
    }
}

fn max_abs<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    values.fold(0.0, |acc: f64, v| acc.max(v.abs()))
}

/// Ratio of the largest imaginary magnitude to the largest real magnitude
pub fn imaginary_residue(real: &DVector<f64>, imaginary: &DVector<f64>) -> f64 {
    let re = max_abs(real.iter());
    let im = max_abs(imaginary.iter());
    if im == 0.0 {
        0.0
    } else if re == 0.0 {
        f64::INFINITY
    } else {
        im / re
    }
}

/// Principal square root of a square matrix treated as symmetric.
///
/// # Errors
/// * `NotSquare` - the matrix is not square
pub fn symmetric_sqrtm(matrix: &DMatrix<f64>) -> Result<MatrixSqrt, OperatorError> {
    let (rows, cols) = matrix.shape();
    if rows != cols {
        return Err(OperatorError::NotSquare { rows, cols });
    }

    let scale = max_abs(matrix.iter());
    let skew = max_abs((matrix - matrix.transpose()).iter());
    let asymmetry = if scale == 0.0 { 0.0 } else { skew / scale };
    if asymmetry > ASYMMETRY_WARNING {
        warn!("Operator asymmetry {asymmetry:.3e}, taking the root of its symmetric part");
    }

    let symmetric = (matrix + matrix.transpose()) * 0.5;
    let eigen = SymmetricEigen::new(symmetric);
    let vectors = &eigen.eigenvectors;

    let positive = eigen.eigenvalues.map(|l| l.max(0.0).sqrt());
    let negative = eigen.eigenvalues.map(|l| (-l).max(0.0).sqrt());

    let real = vectors * DMatrix::from_diagonal(&positive) * vectors.transpose();
    let imaginary = vectors * DMatrix::from_diagonal(&negative) * vectors.transpose();

    Ok(MatrixSqrt {
        real,
        imaginary,
        asymmetry,
    })
}
