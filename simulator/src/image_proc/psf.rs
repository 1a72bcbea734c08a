//! Pixel-integrated double-Laplace PSF kernels.
//!
//! The continuous density `exp(-(|x| + |y|) / b) / (2b)` is integrated over
//! each pixel of a grid centered on the origin, giving a discrete PRF with
//! a sharp core and exponential wings. The density's total mass is `2b`,
//! so kernels only sum to one at `b = 0.5`.

use log::debug;
use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::algo::quadrature::{integrate_rectangle, QuadratureError};

/// Laplace scale at which the discretized kernel has unit mass
pub const DEFAULT_LAPLACE_SCALE: f64 = 0.5;

/// Absolute per-pixel integration tolerance
pub const PIXEL_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PsfError {
    #[error("Laplace scale must be finite and positive, got {0}")]
    InvalidScale(f64),

    #[error("Kernel shape {width}x{height} is empty")]
    EmptyShape { width: usize, height: usize },

    #[error("Pixel integration failed: {0}")]
    Quadrature(#[from] QuadratureError),
}

/// Separable two-sided exponential density
pub fn double_laplace_pdf(x: f64, y: f64, b: f64) -> f64 {
    (-(x.abs() + y.abs()) / b).exp() / (2.0 * b)
}

/// Discretize the double-Laplace density onto a (W, H) pixel grid.
///
/// Pixel edges are `W + 1` points spanning `[-W/2, W/2]` and `H + 1`
/// points spanning `[-H/2, H/2]`. Pixel (i, j) integrates the density over
/// `[x_i, x_{i+1}] x [y_j, y_{j+1}]` and is stored at `[j, i]`.
///
/// # Arguments
/// * `shape` - (width, height) of the kernel in pixels
/// * `b` - Laplace scale in pixels
///
/// # Returns
/// An (H, W) array, symmetric under 180° rotation
pub fn discretized_double_laplace(
    shape: (usize, usize),
    b: f64,
) -> Result<Array2<f64>, PsfError> {
    let (width, height) = shape;
    if width == 0 || height == 0 {
        return Err(PsfError::EmptyShape { width, height });
    }
    if !b.is_finite() || b <= 0.0 {
        return Err(PsfError::InvalidScale(b));
    }

    let half_w = width as f64 / 2.0;
    let half_h = height as f64 / 2.0;
    let x_edges = Array1::linspace(-half_w, half_w, width + 1);
    let y_edges = Array1::linspace(-half_h, half_h, height + 1);
    debug!("Discretizing double-Laplace b={b} onto {width}x{height} pixels");

    let mut kernel = Array2::<f64>::zeros((height, width));
    for i in 0..width {
        for j in 0..height {
            kernel[[j, i]] = integrate_rectangle(
                |x, y| double_laplace_pdf(x, y, b),
                (x_edges[i], x_edges[i + 1]),
                (y_edges[j], y_edges[j + 1]),
                PIXEL_TOLERANCE,
            )?;
        }
    }

    Ok(kernel)
}
