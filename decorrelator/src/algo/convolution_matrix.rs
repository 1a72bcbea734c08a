//! Dense linear operators for 2D correlation by a fixed kernel.
//!
//! The operator maps a flattened (H, W) image to its zero-padded "same"
//! correlation with a kernel. Storage and construction cost are
//! O((H·W)^2), so the domain is capped at [`MAX_OPERATOR_PIXELS`]; this is
//! the hard scalability ceiling of the kernel solver.

use log::debug;
use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};
use thiserror::Error;

use crate::window::WindowShape;

/// Largest domain (in pixels) an operator may be built over
pub const MAX_OPERATOR_PIXELS: usize = 1024;

/// Errors raised while building operators or solving for kernels
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperatorError {
    #[error("Kernel is empty")]
    EmptyKernel,
    #[error("Operator domain {0} is empty")]
    EmptyDomain(WindowShape),
    #[error("Operator domain of {pixels} pixels exceeds the limit of {max}")]
    OperatorTooLarge { pixels: usize, max: usize },
    #[error("Operator must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("Matrix square root has imaginary residue {residue:.3e} above tolerance {tolerance:.3e}")]
    ImaginaryResidue { residue: f64, tolerance: f64 },
    #[error("Kernel sums to zero and cannot be normalized")]
    ZeroSumKernel,
}

/// Zero-padded "same" correlation of `image` with `kernel`.
///
/// The kernel is not flipped and its origin sits at `(Kh/2, Kw/2)`:
/// `out[p] = sum_k image[p + k - c] * kernel[k]`, with pixels outside the
/// image treated as zero. The output has the shape of `image`.
pub fn correlate_same(image: &ArrayView2<f64>, kernel: &ArrayView2<f64>) -> Array2<f64> {
    let (rows, cols) = image.dim();
    let (kernel_rows, kernel_cols) = kernel.dim();
    let kr = (kernel_rows / 2) as isize;
    let kc = (kernel_cols / 2) as isize;

    Array2::from_shape_fn((rows, cols), |(i, j)| {
        let mut sum = 0.0;
        for ki in 0..kernel_rows {
            let ii = i as isize + ki as isize - kr;
            if ii < 0 || ii >= rows as isize {
                continue;
            }
            for kj in 0..kernel_cols {
                let jj = j as isize + kj as isize - kc;
                if jj < 0 || jj >= cols as isize {
                    continue;
                }
                sum += image[[ii as usize, jj as usize]] * kernel[[ki, kj]];
            }
        }
        sum
    })
}

/// Build the (H·W)×(H·W) operator equivalent to correlating with `kernel`.
///
/// Column `i·W + j` is the flattened [`correlate_same`] of the unit basis
/// image at (i, j), which reduces to `A[p, q] = kernel[q - p + c]` where the
/// kernel index is in range and zero elsewhere.
///
/// # Errors
/// * `EmptyKernel` - kernel has no cells
/// * `EmptyDomain` - either domain axis is zero
/// * `OperatorTooLarge` - the domain exceeds [`MAX_OPERATOR_PIXELS`]
pub fn convolution_matrix(
    kernel: &ArrayView2<f64>,
    domain: WindowShape,
) -> Result<DMatrix<f64>, OperatorError> {
    if kernel.is_empty() {
        return Err(OperatorError::EmptyKernel);
    }
    if domain.is_empty() {
        return Err(OperatorError::EmptyDomain(domain));
    }
    let pixels = domain.cell_count();
    if pixels > MAX_OPERATOR_PIXELS {
        return Err(OperatorError::OperatorTooLarge {
            pixels,
            max: MAX_OPERATOR_PIXELS,
        });
    }

    let (kernel_rows, kernel_cols) = kernel.dim();
    let kr = (kernel_rows / 2) as isize;
    let kc = (kernel_cols / 2) as isize;
    let width = domain.cols;
    debug!(
        "Building {pixels}x{pixels} operator for {kernel_rows}x{kernel_cols} kernel over {domain}"
    );

    let operator = DMatrix::from_fn(pixels, pixels, |p, q| {
        let (pi, pj) = ((p / width) as isize, (p % width) as isize);
        let (qi, qj) = ((q / width) as isize, (q % width) as isize);
        let ki = qi - pi + kr;
        let kj = qj - pj + kc;
        if ki < 0 || kj < 0 || ki >= kernel_rows as isize || kj >= kernel_cols as isize {
            0.0
        } else {
            kernel[[ki as usize, kj as usize]]
        }
    });

    Ok(operator)
}

/// Flatten a 2D array row-major into a column vector
pub fn flatten(image: &ArrayView2<f64>) -> nalgebra::DVector<f64> {
    nalgebra::DVector::from_iterator(image.len(), image.iter().copied())
}
