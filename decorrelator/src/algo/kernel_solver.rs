//! Recover a PRF kernel from its measured self-convolution.
//!
//! The self-convolution map `h ⋆ h` is turned into a dense correlation
//! operator over a domain half its size. That operator factors as `Hᵀ H`
//! where `H` correlates with the unknown kernel, so the center row of its
//! principal square root is the kernel itself (up to the finite-domain
//! truncation of the operator).

use log::{debug, warn};
use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::convolution_matrix::{convolution_matrix, flatten, OperatorError};
use super::sqrtm::{imaginary_residue, symmetric_sqrtm};
use crate::window::WindowShape;

/// Default tolerance on the imaginary part of the extracted root row
pub const DEFAULT_MAX_IMAGINARY_RESIDUE: f64 = 1e-3;

/// Kernel recovered by [`KernelSolver::solve`] plus numerical diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct KernelEstimate {
    /// Real part of the center row of the operator root, in operating shape
    pub kernel: Array2<f64>,
    /// max|imag| / max|real| of the extracted row
    pub imaginary_residue: f64,
    /// Relative asymmetry of the operator before it was symmetrized
    pub asymmetry: f64,
}

/// Matrix-square-root kernel solver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KernelSolver {
    /// Largest imaginary residue accepted before failing
    pub max_imaginary_residue: f64,
}

impl Default for KernelSolver {
    fn default() -> Self {
        Self {
            max_imaginary_residue: DEFAULT_MAX_IMAGINARY_RESIDUE,
        }
    }
}

impl KernelSolver {
    pub fn new(max_imaginary_residue: f64) -> Self {
        Self {
            max_imaginary_residue,
        }
    }

    /// Operating shape used for a self-convolution map of the given shape
    pub fn operating_shape(h_conv_h: WindowShape) -> WindowShape {
        WindowShape::new(h_conv_h.rows / 2 + 1, h_conv_h.cols / 2 + 1)
    }

    /// Recover the kernel whose self-correlation is `h_conv_h`.
    ///
    /// # Errors
    /// * `EmptyKernel` - the map has no cells
    /// * `OperatorTooLarge` - the operating shape exceeds the operator limit
    /// * `ImaginaryResidue` - the operator is too far from positive semi-definite
    pub fn solve(&self, h_conv_h: &ArrayView2<f64>) -> Result<KernelEstimate, OperatorError> {
        if h_conv_h.is_empty() {
            return Err(OperatorError::EmptyKernel);
        }
        let shape = Self::operating_shape(WindowShape::of(h_conv_h));
        let operator = convolution_matrix(h_conv_h, shape)?;
        let root = symmetric_sqrtm(&operator)?;

        let center = shape.cell_count() / 2;
        let (real, imaginary) = root.row(center);
        let residue = imaginary_residue(&real, &imaginary);
        debug!(
            "Solved {shape} kernel: residue {residue:.3e}, asymmetry {:.3e}",
            root.asymmetry
        );

        if residue > self.max_imaginary_residue {
            return Err(OperatorError::ImaginaryResidue {
                residue,
                tolerance: self.max_imaginary_residue,
            });
        }
        if residue > 0.0 {
            warn!("Discarding imaginary residue {residue:.3e} of the operator root");
        }

        let kernel = Array2::from_shape_vec(shape.to_tuple(), real.iter().copied().collect())
            .map_err(|_| OperatorError::EmptyDomain(shape))?;

        Ok(KernelEstimate {
            kernel,
            imaginary_residue: residue,
            asymmetry: root.asymmetry,
        })
    }
}

/// Recover a kernel with the default [`KernelSolver`]
pub fn solve_kernel(h_conv_h: &ArrayView2<f64>) -> Result<Array2<f64>, OperatorError> {
    KernelSolver::default()
        .solve(h_conv_h)
        .map(|estimate| estimate.kernel)
}

/// Self-correlation map of a known kernel, shape (2Kh - 1, 2Kw - 1).
///
/// Value at index `d + K - 1` is `sum_x kernel[x] * kernel[x + d]`. Built by
/// applying the kernel's correlation operator to the zero-padded kernel.
pub fn self_correlation(kernel: &ArrayView2<f64>) -> Result<Array2<f64>, OperatorError> {
    if kernel.is_empty() {
        return Err(OperatorError::EmptyKernel);
    }
    let (kh, kw) = kernel.dim();
    let domain = WindowShape::new(2 * kh - 1, 2 * kw - 1);

    // Offset so the correlation origin (K/2) lands lag zero at K - 1
    let (row_offset, col_offset) = (kh - 1 - kh / 2, kw - 1 - kw / 2);
    let mut padded = Array2::<f64>::zeros(domain.to_tuple());
    padded
        .slice_mut(s![row_offset..row_offset + kh, col_offset..col_offset + kw])
        .assign(kernel);

    let operator = convolution_matrix(kernel, domain)?;
    let mapped = &operator * flatten(&padded.view());

    Array2::from_shape_vec(domain.to_tuple(), mapped.iter().copied().collect())
        .map_err(|_| OperatorError::EmptyDomain(domain))
}

/// Divide a kernel by its sum
pub fn normalized_kernel(kernel: &ArrayView2<f64>) -> Result<Array2<f64>, OperatorError> {
    if kernel.is_empty() {
        return Err(OperatorError::EmptyKernel);
    }
    let sum = kernel.sum();
    if sum == 0.0 || !sum.is_finite() {
        return Err(OperatorError::ZeroSumKernel);
    }
    Ok(kernel.mapv(|v| v / sum))
}

/// Quality report of a kernel
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KernelSummary {
    pub shape: WindowShape,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    /// (row, col) of the largest weight, first occurrence
    pub peak: (usize, usize),
    pub centered_peak: bool,
}

impl KernelSummary {
    pub fn of(kernel: &ArrayView2<f64>) -> Result<Self, OperatorError> {
        let shape = WindowShape::of(kernel);
        if shape.is_empty() {
            return Err(OperatorError::EmptyKernel);
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut peak = (0, 0);
        for ((i, j), &v) in kernel.indexed_iter() {
            min = min.min(v);
            if v > max {
                max = v;
                peak = (i, j);
            }
        }

        Ok(Self {
            shape,
            sum: kernel.sum(),
            min,
            max,
            peak,
            centered_peak: peak == shape.center(),
        })
    }

    /// True when every weight is at least `-tolerance`
    pub fn is_non_negative(&self, tolerance: f64) -> bool {
        self.min >= -tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    fn plus_kernel() -> Array2<f64> {
        arr2(&[[0.0, 0.1, 0.0], [0.1, 0.6, 0.1], [0.0, 0.1, 0.0]])
    }

    fn tent_kernel() -> Array2<f64> {
        arr2(&[[0.05, 0.1, 0.05], [0.1, 0.4, 0.1], [0.05, 0.1, 0.05]])
    }

    #[test]
    fn test_self_correlation_of_plus_kernel() {
        let map = self_correlation(&plus_kernel().view()).unwrap();

        assert_eq!(map.dim(), (5, 5));
        assert_relative_eq!(map[[2, 2]], 0.4, epsilon = 1e-12);
        assert_relative_eq!(map[[2, 3]], 0.12, epsilon = 1e-12);
        assert_relative_eq!(map[[1, 2]], 0.12, epsilon = 1e-12);
        assert_relative_eq!(map[[1, 1]], 0.02, epsilon = 1e-12);
        assert_relative_eq!(map[[0, 2]], 0.01, epsilon = 1e-12);
        assert_relative_eq!(map[[0, 0]], 0.0, epsilon = 1e-12);
        assert_relative_eq!(map.sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_self_correlation_of_even_kernel() {
        let kernel = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let map = self_correlation(&kernel.view()).unwrap();

        assert_eq!(map.dim(), (3, 3));
        assert_relative_eq!(map[[1, 1]], 30.0);
        // Lag (0, +1): 1*2 + 3*4
        assert_relative_eq!(map[[1, 2]], 14.0);
        assert_relative_eq!(map[[1, 0]], 14.0);
        // Lag (+1, +1): 1*4
        assert_relative_eq!(map[[2, 2]], 4.0);
        // Lag (+1, -1): 2*3
        assert_relative_eq!(map[[2, 0]], 6.0);
    }

    #[test]
    fn test_round_trip_plus_kernel() {
        let truth = plus_kernel();
        let map = self_correlation(&truth.view()).unwrap();

        let estimate = KernelSolver::default().solve(&map.view()).unwrap();

        assert_eq!(estimate.kernel.dim(), (3, 3));
        assert!(estimate.imaginary_residue < 1e-3);
        assert_relative_eq!(estimate.asymmetry, 0.0, epsilon = 1e-12);
        for (a, b) in estimate.kernel.iter().zip(truth.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_round_trip_tent_kernel() {
        let truth = tent_kernel();
        let map = self_correlation(&truth.view()).unwrap();

        let kernel = solve_kernel(&map.view()).unwrap();

        for (a, b) in kernel.iter().zip(truth.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-2);
        }
        let summary = KernelSummary::of(&kernel.view()).unwrap();
        assert!(summary.centered_peak);
        assert!(summary.is_non_negative(0.0));
    }

    #[test]
    fn test_operating_shape() {
        assert_eq!(
            KernelSolver::operating_shape(WindowShape::square(5)),
            WindowShape::square(3)
        );
        assert_eq!(
            KernelSolver::operating_shape(WindowShape::new(3, 7)),
            WindowShape::new(2, 4)
        );
    }

    #[test]
    fn test_indefinite_map_rejected() {
        // Negative center makes the operator negative definite
        let map = arr2(&[[0.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 0.0]]);
        let result = KernelSolver::default().solve(&map.view());
        assert!(matches!(
            result,
            Err(OperatorError::ImaginaryResidue { .. })
        ));

        // A permissive solver still returns the (zero) real part
        let estimate = KernelSolver::new(f64::INFINITY).solve(&map.view()).unwrap();
        assert_eq!(estimate.imaginary_residue, f64::INFINITY);
        assert_relative_eq!(estimate.kernel.sum(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_solver_limits() {
        let empty = Array2::<f64>::zeros((0, 3));
        assert_eq!(solve_kernel(&empty.view()), Err(OperatorError::EmptyKernel));

        let huge = Array2::<f64>::zeros((65, 65));
        assert_eq!(
            solve_kernel(&huge.view()),
            Err(OperatorError::OperatorTooLarge {
                pixels: 33 * 33,
                max: crate::algo::convolution_matrix::MAX_OPERATOR_PIXELS
            })
        );
    }

    #[test]
    fn test_normalized_kernel() {
        let kernel = arr2(&[[1.0, 1.0], [1.0, 2.0]]);
        let normalized = normalized_kernel(&kernel.view()).unwrap();
        assert_relative_eq!(normalized.sum(), 1.0);
        assert_relative_eq!(normalized[[1, 1]], 0.4);

        let zero = arr2(&[[1.0, -1.0]]);
        assert_eq!(
            normalized_kernel(&zero.view()),
            Err(OperatorError::ZeroSumKernel)
        );
    }

    #[test]
    fn test_summary() {
        let summary = KernelSummary::of(&plus_kernel().view()).unwrap();
        assert_eq!(summary.shape, WindowShape::square(3));
        assert_relative_eq!(summary.sum, 1.0);
        assert_eq!(summary.min, 0.0);
        assert_eq!(summary.max, 0.6);
        assert_eq!(summary.peak, (1, 1));
        assert!(summary.centered_peak);

        let off = arr2(&[[0.9, 0.1], [0.0, -0.2]]);
        let summary = KernelSummary::of(&off.view()).unwrap();
        assert_eq!(summary.peak, (0, 0));
        assert!(!summary.centered_peak);
        assert!(!summary.is_non_negative(0.1));

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"centered_peak\":false"));
    }
}
