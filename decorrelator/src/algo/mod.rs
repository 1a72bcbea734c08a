//! Linear-algebra side of PRF recovery
//!
//! This module builds dense correlation operators, takes their principal
//! square root, and extracts the kernel from the center row of the root.

pub mod convolution_matrix;
pub mod kernel_solver;
pub mod sqrtm;

pub use convolution_matrix::{
    convolution_matrix, correlate_same, OperatorError, MAX_OPERATOR_PIXELS,
};
pub use kernel_solver::{
    normalized_kernel, self_correlation, solve_kernel, KernelEstimate, KernelSolver,
    KernelSummary,
};
pub use sqrtm::{symmetric_sqrtm, MatrixSqrt};
