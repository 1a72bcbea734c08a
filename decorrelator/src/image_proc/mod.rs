//! Image-stack processing for PRF estimation
//!
//! Noise residual estimators, spatial correlation estimators over residual
//! stacks, and cached Fourier-domain filters that apply or invert a PRF on
//! full frames.

pub mod correlation;
pub mod filter;
pub mod fourier;
pub mod noise;

// Re-export key functionality for easier access
pub use correlation::{
    autocorrelation_of_residuals, correlation_map, estimate_autocorrelation,
    AutocorrelationConfig,
};
pub use filter::{Convolve, Deconvolve, FilterError, PrfFilter, TransferCache};
pub use noise::{noise_residuals, simple_normal_stack, EstimationError, NoiseModel, DEFAULT_DT};
