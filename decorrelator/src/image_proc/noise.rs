//! Noise residual estimation for photon-counting detector stacks.
//!
//! Turns a raw frame stack of shape (N, H, W) into a variance-stabilized
//! residual stack in which every pixel carries approximately unit-variance
//! noise. Two models of the noise-free signal are provided:
//!
//! - **Mean**: the per-pixel temporal mean estimates both the signal and,
//!   through the Poisson mean-variance equality, the per-pixel variance.
//! - **Differences**: frames are paired with the frame `dt` steps later and
//!   the difference is normalized by its own temporal variance. This removes
//!   any static signal without assuming Poisson statistics, at the cost of a
//!   doubled noise variance which is normalized away.
//!
//! Pixels whose estimated variance is zero keep their raw residual so the
//! output never contains non-finite values.

use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use ndarray::{s, Array2, Array3, ArrayView3, Axis, Zip};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::window::WindowShape;

/// Frame lag used when the `differences` estimator is selected by name
pub const DEFAULT_DT: usize = 3;

/// Errors raised by the noise, autocorrelation and correlation-map estimators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimationError {
    #[error("Frame stack is empty")]
    EmptyStack,
    #[error("Not enough frames for dt={dt}: got {frames}, need at least {}", .dt + 1)]
    InsufficientFrames { frames: usize, dt: usize },
    #[error("Frame lag dt must be at least 1")]
    ZeroLag,
    #[error("Unknown estimator '{0}', expected 'mean' or 'differences'")]
    UnknownEstimator(String),
    #[error("Window {0} must have odd, non-zero dimensions")]
    EvenWindow(WindowShape),
    #[error("Window {window} with padding {padding} leaves no pixels in a {height}x{width} frame")]
    WindowTooLarge {
        window: WindowShape,
        padding: usize,
        height: usize,
        width: usize,
    },
}

/// Model of the noise-free signal used to build residuals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseModel {
    /// Temporal mean as signal and Poisson variance estimate
    #[default]
    Mean,
    /// Difference of frames `dt` apart, normalized by their temporal variance
    Differences { dt: usize },
}

impl NoiseModel {
    /// Select a model by name, using `dt` for the differences estimator
    pub fn from_name(name: &str, dt: usize) -> Result<Self, EstimationError> {
        match name {
            "mean" => Ok(NoiseModel::Mean),
            "differences" => Ok(NoiseModel::Differences { dt }),
            other => Err(EstimationError::UnknownEstimator(other.to_string())),
        }
    }

    /// Estimator name as accepted by [`NoiseModel::from_name`]
    pub fn name(&self) -> &'static str {
        match self {
            NoiseModel::Mean => "mean",
            NoiseModel::Differences { .. } => "differences",
        }
    }
}

impl FromStr for NoiseModel {
    type Err = EstimationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NoiseModel::from_name(s, DEFAULT_DT)
    }
}

impl fmt::Display for NoiseModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NoiseModel::Mean => write!(f, "mean"),
            NoiseModel::Differences { dt } => write!(f, "differences(dt={dt})"),
        }
    }
}

/// Build the variance-stabilized residual stack for `frames`.
///
/// # Arguments
/// * `frames` - Frame stack of shape (N, H, W), time on axis 0
/// * `model` - Noise model selecting how signal and variance are estimated
///
/// # Returns
/// * `Mean`: an (N, H, W) stack of `(frame - mean) / sqrt(mean)`
/// * `Differences { dt }`: an (N - dt, H, W) stack of
///   `(frame[t] - frame[t + dt]) / std(differences)`
///
/// # Errors
/// * `EmptyStack` - no frames or zero-sized frames
/// * `ZeroLag` - `dt` is zero
/// * `InsufficientFrames` - fewer than `dt + 1` frames for `Differences`
pub fn noise_residuals(
    frames: &ArrayView3<f64>,
    model: NoiseModel,
) -> Result<Array3<f64>, EstimationError> {
    let (n, height, width) = frames.dim();
    if n == 0 || height == 0 || width == 0 {
        return Err(EstimationError::EmptyStack);
    }

    let (mut residuals, std_dev) = match model {
        NoiseModel::Mean => mean_residuals(frames),
        NoiseModel::Differences { dt } => difference_residuals(frames, dt)?,
    };

    let unnormalized = std_dev.iter().filter(|&&s| s == 0.0).count();
    debug!(
        "Noise residuals via {model}: {} frames of {height}x{width}, {unnormalized} zero-variance pixels",
        residuals.len_of(Axis(0))
    );
    if unnormalized > 0 {
        warn!("{unnormalized} pixels have zero estimated variance and keep raw residuals");
    }

    for mut frame in residuals.outer_iter_mut() {
        Zip::from(&mut frame).and(&std_dev).for_each(|r, &s| {
            if s != 0.0 {
                *r /= s;
            }
        });
    }

    Ok(residuals)
}

/// Residuals against the temporal mean with Poisson standard deviation
fn mean_residuals(frames: &ArrayView3<f64>) -> (Array3<f64>, Array2<f64>) {
    let (_, height, width) = frames.dim();
    let mean = frames
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array2::zeros((height, width)));

    let residuals = frames - &mean.view().insert_axis(Axis(0));

    // Poisson: variance equals the mean, so non-positive means carry no scale
    let std_dev = mean.mapv(|m| if m > 0.0 { m.sqrt() } else { 0.0 });
    (residuals, std_dev)
}

/// Residuals from frames `dt` apart with their own temporal standard deviation
fn difference_residuals(
    frames: &ArrayView3<f64>,
    dt: usize,
) -> Result<(Array3<f64>, Array2<f64>), EstimationError> {
    let n = frames.len_of(Axis(0));
    if dt == 0 {
        return Err(EstimationError::ZeroLag);
    }
    if n <= dt {
        return Err(EstimationError::InsufficientFrames { frames: n, dt });
    }

    let differences = &frames.slice(s![..n - dt, .., ..]) - &frames.slice(s![dt.., .., ..]);
    let std_dev = differences
        .var_axis(Axis(0), 0.0)
        .mapv(|v| v.max(0.0).sqrt());

    Ok((differences, std_dev))
}

/// Generate a seeded stack of normally distributed frames.
///
/// Deterministic for a given seed, which makes it the noise source of
/// choice for estimator tests and validation runs.
///
/// # Arguments
/// * `shape` - Tuple of (frames, height, width)
/// * `mean` - Mean value of the normal distribution
/// * `std_dev` - Standard deviation of the normal distribution
/// * `seed` - Random seed for deterministic output
///
/// # Example
/// ```
/// use decorrelator::image_proc::noise::simple_normal_stack;
///
/// let stack = simple_normal_stack((4, 10, 12), 0.0, 1.0, 42);
/// assert_eq!(stack.dim(), (4, 10, 12));
/// ```
pub fn simple_normal_stack(
    shape: (usize, usize, usize),
    mean: f64,
    std_dev: f64,
    seed: u64,
) -> Array3<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal_dist = Normal::new(mean, std_dev).unwrap();
    Array3::from_shape_fn(shape, |_| normal_dist.sample(&mut rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_estimator_names() {
        assert_eq!("mean".parse::<NoiseModel>().unwrap(), NoiseModel::Mean);
        assert_eq!(
            "differences".parse::<NoiseModel>().unwrap(),
            NoiseModel::Differences { dt: DEFAULT_DT }
        );
        assert_eq!(
            NoiseModel::from_name("differences", 1).unwrap(),
            NoiseModel::Differences { dt: 1 }
        );
        assert_eq!(
            "median".parse::<NoiseModel>(),
            Err(EstimationError::UnknownEstimator("median".to_string()))
        );
        assert_eq!(NoiseModel::default(), NoiseModel::Mean);
    }

    #[test]
    fn test_differences_rejects_short_stack() {
        let frames = Array3::from_elem((3, 4, 4), 7.0);

        let result = noise_residuals(&frames.view(), NoiseModel::Differences { dt: 3 });
        assert_eq!(
            result,
            Err(EstimationError::InsufficientFrames { frames: 3, dt: 3 })
        );

        let result = noise_residuals(&frames.view(), NoiseModel::Differences { dt: 0 });
        assert_eq!(result, Err(EstimationError::ZeroLag));
    }

    #[test]
    fn test_differences_of_identical_frames_are_zero() {
        let frames = Array3::from_elem((4, 5, 6), 12.5);

        let residuals = noise_residuals(&frames.view(), NoiseModel::Differences { dt: 3 }).unwrap();

        assert_eq!(residuals.dim(), (1, 5, 6));
        assert!(residuals.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_empty_stack_rejected() {
        let frames = Array3::<f64>::zeros((0, 4, 4));
        assert_eq!(
            noise_residuals(&frames.view(), NoiseModel::Mean),
            Err(EstimationError::EmptyStack)
        );
    }

    #[test]
    fn test_mean_residuals_poisson_normalization() {
        // Two frames around a mean of 4: residual +-2, std sqrt(4) = 2
        let mut frames = Array3::<f64>::zeros((2, 2, 2));
        frames.slice_mut(s![0, .., ..]).fill(6.0);
        frames.slice_mut(s![1, .., ..]).fill(2.0);

        let residuals = noise_residuals(&frames.view(), NoiseModel::Mean).unwrap();

        assert_eq!(residuals.dim(), (2, 2, 2));
        for &v in residuals.slice(s![0, .., ..]).iter() {
            assert_relative_eq!(v, 1.0, epsilon = 1e-12);
        }
        for &v in residuals.slice(s![1, .., ..]).iter() {
            assert_relative_eq!(v, -1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_mean_zero_variance_left_unnormalized() {
        // Pixel (0, 0) has zero mean, so its residual must stay raw
        let mut frames = Array3::<f64>::from_elem((2, 2, 2), 9.0);
        frames[[0, 0, 0]] = 1.0;
        frames[[1, 0, 0]] = -1.0;

        let residuals = noise_residuals(&frames.view(), NoiseModel::Mean).unwrap();

        assert_eq!(residuals[[0, 0, 0]], 1.0);
        assert_eq!(residuals[[1, 0, 0]], -1.0);
        assert!(residuals.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_differences_have_unit_variance() {
        let frames = simple_normal_stack((400, 8, 8), 50.0, 3.0, 7);

        let residuals = noise_residuals(&frames.view(), NoiseModel::Differences { dt: 1 }).unwrap();

        let variance = residuals.var_axis(Axis(0), 0.0);
        for &v in variance.iter() {
            assert_relative_eq!(v, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_simple_normal_stack_deterministic() {
        let a = simple_normal_stack((2, 5, 5), 0.0, 1.0, 11);
        let b = simple_normal_stack((2, 5, 5), 0.0, 1.0, 11);
        let c = simple_normal_stack((2, 5, 5), 0.0, 1.0, 12);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
