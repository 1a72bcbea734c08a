//! Forward model for PRF-blurred photon-counting frame stacks.
//!
//! Each frame draws Poisson photon counts from the true image, blurs them
//! with the PRF through a cached Fourier [`Convolve`] filter, and optionally
//! adds Gaussian read noise. Frames are sampled in parallel from per-frame
//! RNGs seeded by `seed + frame index`, so seeded output does not depend on
//! the number of worker threads.

use decorrelator::image_proc::filter::{Convolve, FilterError, PrfFilter};
use log::{debug, info};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Poisson};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of simulated frames
pub const DEFAULT_FRAMES: usize = 1000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Poisson rate must be finite and non-negative, got {rate} at ({row}, {col})")]
    InvalidRate { rate: f64, row: usize, col: usize },

    #[error("Read noise sigma must be finite and non-negative, got {0}")]
    InvalidSigma(f64),

    #[error("PRF filter failed: {0}")]
    Filter(#[from] FilterError),
}

/// Frame count and read noise of a simulated stack
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub frames: usize,
    /// Standard deviation of additive Gaussian read noise, 0 disables it
    pub read_noise_sigma: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frames: DEFAULT_FRAMES,
            read_noise_sigma: 0.0,
        }
    }
}

impl SimulationConfig {
    pub fn new(frames: usize, read_noise_sigma: f64) -> Self {
        Self {
            frames,
            read_noise_sigma,
        }
    }
}

// One sampler per pixel, None where the rate is zero
fn photon_samplers(
    image: &ArrayView2<f64>,
) -> Result<Array2<Option<Poisson<f64>>>, SimulationError> {
    for ((row, col), &rate) in image.indexed_iter() {
        let invalid = SimulationError::InvalidRate { rate, row, col };
        if !rate.is_finite() || rate < 0.0 {
            return Err(invalid);
        }
        if rate > 0.0 && Poisson::new(rate).is_err() {
            return Err(invalid);
        }
    }
    Ok(image.mapv(|rate| Poisson::new(rate).ok()))
}

fn read_noise(sigma: f64) -> Result<Option<Normal<f64>>, SimulationError> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(SimulationError::InvalidSigma(sigma));
    }
    if sigma == 0.0 {
        return Ok(None);
    }
    Normal::new(0.0, sigma)
        .map(Some)
        .map_err(|_| SimulationError::InvalidSigma(sigma))
}

/// Simulate a stack of PRF-blurred Poisson frames.
///
/// # Arguments
/// * `image` - True photon rate per pixel
/// * `prf` - PRF kernel, no larger than `image`
/// * `config` - Frame count and read noise
/// * `rng_seed` - Base seed; a random one is drawn when `None`
///
/// # Returns
/// A (frames, H, W) stack
pub fn simulate_frames(
    image: &ArrayView2<f64>,
    prf: &ArrayView2<f64>,
    config: &SimulationConfig,
    rng_seed: Option<u64>,
) -> Result<Array3<f64>, SimulationError> {
    let samplers = photon_samplers(image)?;
    let noise = read_noise(config.read_noise_sigma)?;
    let convolve = Convolve::new(prf.to_owned())?;

    let seed = rng_seed.unwrap_or_else(rand::random);
    let (height, width) = image.dim();
    info!(
        "Simulating {} frames of {height}x{width} with read noise sigma {}",
        config.frames, config.read_noise_sigma
    );
    debug!("Simulation base seed {seed}");

    let mut stack = Array3::<f64>::zeros((config.frames, height, width));
    stack
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .try_for_each_init(
            || convolve.clone(),
            |convolve, (index, mut frame)| -> Result<(), SimulationError> {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
                let counts = samplers.map(|sampler| match sampler {
                    Some(poisson) => poisson.sample(&mut rng),
                    None => 0.0,
                });

                let mut blurred = convolve.apply(&counts.view())?;
                if let Some(normal) = &noise {
                    blurred.mapv_inplace(|v| v + normal.sample(&mut rng));
                }
                frame.assign(&blurred);
                Ok(())
            },
        )?;

    Ok(stack)
}
