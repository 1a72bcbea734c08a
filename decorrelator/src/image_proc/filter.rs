//! Fourier-domain convolution and deconvolution by a PRF kernel.
//!
//! Both filters transform the kernel zero-padded to the image shape (its
//! optical transfer function, OTF) and multiply in frequency space. The
//! OTF is memoized in a single-slot [`TransferCache`] keyed by image shape:
//! repeated calls on same-sized images reuse it, a call with a new shape
//! replaces it.
//!
//! # Centering
//! The padded kernel sits in the top-left corner, so the raw product is
//! displaced by the kernel's origin. [`Convolve`] rolls the result by
//! `floor(-K/2) + 1` on each axis and [`Deconvolve`] by `floor(K/2)`.
//! For odd kernel sizes the two shifts cancel exactly.
//!
//! # Regularization
//! [`Deconvolve`] multiplies by the Wiener factor
//! `conj(OTF) / (|OTF|^2 + reg)`. With `reg = 0` this is exact inversion
//! wherever the OTF is non-zero; frequencies where the OTF vanishes are
//! zeroed rather than producing NaN. Noisy data wants a small positive
//! `reg` to avoid amplifying high-frequency noise.

use log::debug;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use num_complex::Complex64;
use thiserror::Error;

use super::fourier::{roll2, Fft2Plan};

/// Errors raised by the Fourier filters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Image is empty")]
    EmptyImage,
    #[error("Kernel is empty")]
    EmptyKernel,
    #[error("Kernel {kernel:?} is larger than image {image:?}")]
    KernelLargerThanImage {
        kernel: (usize, usize),
        image: (usize, usize),
    },
    #[error("Regularization must be finite and non-negative, got {0}")]
    InvalidRegularization(f64),
}

/// Transfer function computed for one image shape
#[derive(Debug, Clone)]
pub struct CachedTransfer {
    plan: Fft2Plan,
    otf: Array2<Complex64>,
    multiplier: Array2<Complex64>,
}

impl CachedTransfer {
    /// Image shape this entry was computed for
    pub fn shape(&self) -> (usize, usize) {
        self.plan.shape()
    }

    /// Transform of the zero-padded kernel
    pub fn otf(&self) -> &Array2<Complex64> {
        &self.otf
    }

    /// Factor the image spectrum is multiplied by: the OTF itself when
    /// convolving, the Wiener factor when deconvolving
    pub fn multiplier(&self) -> &Array2<Complex64> {
        &self.multiplier
    }

    /// Multiply the spectrum of `image` by the cached factor and transform back
    fn filter(&self, image: &ArrayView2<f64>) -> Array2<f64> {
        let spectrum = self.plan.forward_real(image) * &self.multiplier;
        self.plan.inverse_real(spectrum)
    }
}

/// Single-slot memo of the kernel's transfer function.
///
/// Holds at most one shape. Updates go through `&mut self`, so sharing
/// a filter across threads needs external locking; give each worker its
/// own filter instead.
#[derive(Debug, Clone, Default)]
pub struct TransferCache {
    entry: Option<CachedTransfer>,
    computations: usize,
}

impl TransferCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Shape of the cached entry, if any
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.entry.as_ref().map(CachedTransfer::shape)
    }

    /// Number of times the transfer function has been (re)computed
    pub fn computations(&self) -> usize {
        self.computations
    }

    /// Drop the cached entry
    pub fn clear(&mut self) {
        self.entry = None;
    }

    /// Return the entry for `shape`, recomputing it when the shape changed.
    ///
    /// With `regularization` set the multiplier is the Wiener factor,
    /// otherwise the OTF.
    pub fn get_or_compute(
        &mut self,
        kernel: &ArrayView2<f64>,
        shape: (usize, usize),
        regularization: Option<f64>,
    ) -> &CachedTransfer {
        let entry = match self.entry.take() {
            Some(entry) if entry.shape() == shape => entry,
            _ => {
                debug!("Computing transfer function for {shape:?}");
                self.computations += 1;
                let plan = Fft2Plan::new(shape);
                let otf = plan.forward_padded(kernel);
                let multiplier = match regularization {
                    Some(reg) => wiener_factor(&otf, reg),
                    None => otf.clone(),
                };
                CachedTransfer {
                    plan,
                    otf,
                    multiplier,
                }
            }
        };
        self.entry.insert(entry)
    }
}

// conj(H) / (|H|^2 + reg), zero where the denominator vanishes
fn wiener_factor(otf: &Array2<Complex64>, regularization: f64) -> Array2<Complex64> {
    otf.mapv(|h| {
        let denominator = h.norm_sqr() + regularization;
        if denominator == 0.0 {
            Complex64::new(0.0, 0.0)
        } else {
            h.conj() / denominator
        }
    })
}

fn validate(kernel: &Array2<f64>, image: &ArrayView2<f64>) -> Result<(), FilterError> {
    let (ih, iw) = image.dim();
    if ih == 0 || iw == 0 {
        return Err(FilterError::EmptyImage);
    }
    let (kh, kw) = kernel.dim();
    if kh > ih || kw > iw {
        return Err(FilterError::KernelLargerThanImage {
            kernel: (kh, kw),
            image: (ih, iw),
        });
    }
    Ok(())
}

fn validate_kernel(kernel: &Array2<f64>) -> Result<(), FilterError> {
    if kernel.is_empty() {
        return Err(FilterError::EmptyKernel);
    }
    Ok(())
}

/// A cached Fourier-domain filter applied image by image
pub trait PrfFilter {
    /// Filter a single image
    fn apply(&mut self, image: &ArrayView2<f64>) -> Result<Array2<f64>, FilterError>;

    /// Filter every frame of an (N, H, W) stack, reusing the cached transfer
    fn apply_stack(&mut self, frames: &ArrayView3<f64>) -> Result<Array3<f64>, FilterError> {
        let mut out = Array3::<f64>::zeros(frames.dim());
        for (frame, mut target) in frames.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
            target.assign(&self.apply(&frame)?);
        }
        Ok(out)
    }
}

/// Convolve images with a PRF kernel in Fourier space
#[derive(Debug, Clone)]
pub struct Convolve {
    kernel: Array2<f64>,
    cache: TransferCache,
}

impl Convolve {
    /// Build a convolution filter for `kernel`
    pub fn new(kernel: Array2<f64>) -> Result<Self, FilterError> {
        validate_kernel(&kernel)?;
        Ok(Self {
            kernel,
            cache: TransferCache::new(),
        })
    }

    /// The PRF kernel
    pub fn kernel(&self) -> &Array2<f64> {
        &self.kernel
    }

    /// Transfer function cache
    pub fn cache(&self) -> &TransferCache {
        &self.cache
    }

    /// Row and column roll applied after the inverse transform
    pub fn centering_shift(&self) -> (isize, isize) {
        let (kh, kw) = self.kernel.dim();
        (
            (-(kh as isize)).div_euclid(2) + 1,
            (-(kw as isize)).div_euclid(2) + 1,
        )
    }
}

impl PrfFilter for Convolve {
    fn apply(&mut self, image: &ArrayView2<f64>) -> Result<Array2<f64>, FilterError> {
        validate(&self.kernel, image)?;
        let (shift_rows, shift_cols) = self.centering_shift();

        let out = self
            .cache
            .get_or_compute(&self.kernel.view(), image.dim(), None)
            .filter(image);

        Ok(roll2(&out.view(), shift_rows, shift_cols))
    }
}

/// Deconvolve images by a PRF kernel with optional Wiener regularization
#[derive(Debug, Clone)]
pub struct Deconvolve {
    kernel: Array2<f64>,
    regularization: f64,
    cache: TransferCache,
}

impl Deconvolve {
    /// Build an exact (unregularized) deconvolution filter for `kernel`
    pub fn new(kernel: Array2<f64>) -> Result<Self, FilterError> {
        validate_kernel(&kernel)?;
        Ok(Self {
            kernel,
            regularization: 0.0,
            cache: TransferCache::new(),
        })
    }

    /// Set the Wiener regularization constant, invalidating any cached factor
    pub fn with_regularization(mut self, regularization: f64) -> Result<Self, FilterError> {
        if !regularization.is_finite() || regularization < 0.0 {
            return Err(FilterError::InvalidRegularization(regularization));
        }
        self.regularization = regularization;
        self.cache.clear();
        Ok(self)
    }

    /// The PRF kernel
    pub fn kernel(&self) -> &Array2<f64> {
        &self.kernel
    }

    /// Wiener regularization constant
    pub fn regularization(&self) -> f64 {
        self.regularization
    }

    /// Transfer function cache
    pub fn cache(&self) -> &TransferCache {
        &self.cache
    }

    /// Row and column roll applied after the inverse transform
    pub fn centering_shift(&self) -> (isize, isize) {
        let (kh, kw) = self.kernel.dim();
        ((kh / 2) as isize, (kw / 2) as isize)
    }
}

impl PrfFilter for Deconvolve {
    fn apply(&mut self, image: &ArrayView2<f64>) -> Result<Array2<f64>, FilterError> {
        validate(&self.kernel, image)?;
        let (shift_rows, shift_cols) = self.centering_shift();

        let out = self
            .cache
            .get_or_compute(&self.kernel.view(), image.dim(), Some(self.regularization))
            .filter(image);

        Ok(roll2(&out.view(), shift_rows, shift_cols))
    }
}
