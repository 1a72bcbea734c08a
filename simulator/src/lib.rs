//! Forward simulation of photon-counting detectors with a known PRF.
//!
//! Generates the frame stacks the `decorrelator` estimators consume: pixel
//! integrated PSF kernels and Poisson frames blurred by them.

pub mod algo;
pub mod image_proc;

pub use image_proc::{
    discretized_double_laplace, simulate_frames, PsfError, SimulationConfig, SimulationError,
};
