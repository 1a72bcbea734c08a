//! Point-response function estimation for photon-counting detectors.
//!
//! A detector's PRF blurs independent shot noise into spatially correlated
//! noise. This crate measures that correlation from a stack of frames,
//! recovers the PRF kernel from it, and applies or inverts the PRF with
//! cached Fourier filters.

pub mod algo;
pub mod image_proc;
pub mod window;

pub use algo::{solve_kernel, KernelEstimate, KernelSolver, KernelSummary, OperatorError};
pub use image_proc::{
    estimate_autocorrelation, AutocorrelationConfig, Convolve, Deconvolve, EstimationError,
    FilterError, NoiseModel, PrfFilter,
};
pub use window::WindowShape;
