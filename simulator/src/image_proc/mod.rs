//! Image generation for PRF simulation
//!
//! This module discretizes continuous PSF models into pixel kernels and
//! simulates noisy frame stacks blurred by a PRF.

pub mod frames;
pub mod psf;

// Re-export key functionality for easier access
pub use frames::{simulate_frames, SimulationConfig, SimulationError};
pub use psf::{discretized_double_laplace, double_laplace_pdf, PsfError};
