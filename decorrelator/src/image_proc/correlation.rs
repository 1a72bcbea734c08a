//! Spatial correlation estimators over noise residual stacks.
//!
//! A PRF smooths independent per-pixel noise into spatially correlated
//! noise. Once residuals are variance-stabilized (see [`super::noise`]),
//! their autocovariance window is the self-convolution of the PRF, which
//! is what [`crate::algo::kernel_solver`] inverts.
//!
//! Offsets follow a single-axis convention: for window cell (i, j) the
//! residual stack is shifted by the row offset in one copy and by the
//! column offset in a second, independent copy, and the two copies are
//! multiplied.

use log::debug;
use ndarray::{s, Array2, ArrayView3, Axis, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::fourier::roll;
use super::noise::{noise_residuals, EstimationError, NoiseModel};
use crate::window::WindowShape;

/// Parameters of the windowed autocorrelation estimate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutocorrelationConfig {
    /// How residuals are derived from raw frames
    pub noise_model: NoiseModel,
    /// Output window, odd on both axes
    pub window: WindowShape,
}

impl AutocorrelationConfig {
    /// Config with the given noise model and window
    pub fn new(noise_model: NoiseModel, window: WindowShape) -> Self {
        Self {
            noise_model,
            window,
        }
    }

    /// Border cropped from every spatial edge before averaging
    pub fn padding(&self) -> usize {
        crop_padding(self.window)
    }
}

/// Border cropped from each edge so shifted copies never wrap
pub fn crop_padding(window: WindowShape) -> usize {
    window.max_extent() + 1
}

fn validate_window(window: WindowShape) -> Result<(), EstimationError> {
    if window.is_empty() || !window.is_odd() {
        return Err(EstimationError::EvenWindow(window));
    }
    Ok(())
}

fn validate_crop(window: WindowShape, height: usize, width: usize) -> Result<(), EstimationError> {
    let padding = crop_padding(window);
    if height <= 2 * padding || width <= 2 * padding {
        return Err(EstimationError::WindowTooLarge {
            window,
            padding,
            height,
            width,
        });
    }
    Ok(())
}

/// Estimate the spatial autocovariance window of the noise in `frames`.
///
/// Residuals are derived with `config.noise_model`, then each window cell
/// (i, j) holds the mean over time and the cropped image plane of the
/// residual shifted by the cell's row offset times the residual shifted
/// by its column offset.
///
/// # Errors
/// * `EvenWindow` - window has an even or zero dimension
/// * `WindowTooLarge` - cropping by `max(window) + 1` leaves no pixels
/// * any error from [`noise_residuals`]
pub fn estimate_autocorrelation(
    frames: &ArrayView3<f64>,
    config: &AutocorrelationConfig,
) -> Result<Array2<f64>, EstimationError> {
    validate_window(config.window)?;
    let (_, height, width) = frames.dim();
    validate_crop(config.window, height, width)?;

    let residuals = noise_residuals(frames, config.noise_model)?;
    autocorrelation_of_residuals(&residuals.view(), config.window)
}

/// Autocovariance window of an already normalized residual stack
pub fn autocorrelation_of_residuals(
    residuals: &ArrayView3<f64>,
    window: WindowShape,
) -> Result<Array2<f64>, EstimationError> {
    validate_window(window)?;
    let (n, height, width) = residuals.dim();
    if n == 0 || height == 0 || width == 0 {
        return Err(EstimationError::EmptyStack);
    }
    validate_crop(window, height, width)?;

    let padding = crop_padding(window);
    let crop_h = height - 2 * padding;
    let crop_w = width - 2 * padding;
    let count = (n * crop_h * crop_w) as f64;
    debug!(
        "Autocorrelation {window} over {n} residual frames, cropped to {crop_h}x{crop_w}"
    );

    // |offset| <= window / 2 < padding, so a cropped view of a rolled copy
    // is a plain shifted slice of the residual stack and never wraps
    let mut out = Array2::<f64>::zeros(window.to_tuple());
    Zip::indexed(&mut out).par_for_each(|(i, j), cell| {
        let (di, dj) = window.offset(i, j);
        let row_start = (padding as isize - di) as usize;
        let col_start = (padding as isize - dj) as usize;

        let row_shifted = residuals.slice(s![
            ..,
            row_start..row_start + crop_h,
            padding..padding + crop_w
        ]);
        let col_shifted = residuals.slice(s![
            ..,
            padding..padding + crop_h,
            col_start..col_start + crop_w
        ]);

        let sum = Zip::from(&row_shifted)
            .and(&col_shifted)
            .fold(0.0, |acc, &a, &b| acc + a * b);
        *cell = sum / count;
    });

    Ok(out)
}

/// Per-pixel sum of correlations with spatial neighbours.
///
/// For every offset of `window` except the center, the residual stack is
/// rolled along rows and, separately, along columns; the temporal mean of
/// their product is accumulated over the full image plane. No cropping is
/// applied, so values near the border include wrapped neighbours. Intended
/// as a coarse diagnostic surface rather than a precision estimate.
///
/// # Returns
/// An (H, W) array of summed neighbour correlations, self excluded
pub fn correlation_map(
    frames: &ArrayView3<f64>,
    noise_model: NoiseModel,
    window: WindowShape,
) -> Result<Array2<f64>, EstimationError> {
    validate_window(window)?;
    let residuals = noise_residuals(frames, noise_model)?;
    let (_, height, width) = residuals.dim();
    let center = window.center();

    let cells: Vec<(usize, usize)> = (0..window.rows)
        .flat_map(|i| (0..window.cols).map(move |j| (i, j)))
        .filter(|&cell| cell != center)
        .collect();
    debug!(
        "Correlation map over {} neighbour offsets of {window}",
        cells.len()
    );

    let map = cells
        .par_iter()
        .map(|&(i, j)| {
            let (di, dj) = window.offset(i, j);
            let row_shifted = roll(&residuals.view(), Axis(1), di);
            let col_shifted = roll(&residuals.view(), Axis(2), dj);
            (row_shifted * col_shifted)
                .mean_axis(Axis(0))
                .unwrap_or_else(|| Array2::zeros((height, width)))
        })
        .reduce(|| Array2::zeros((height, width)), |acc, term| acc + term);

    Ok(map)
}
