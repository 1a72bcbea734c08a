//! 2D Fourier transform and circular shift helpers.
//!
//! Row-column decomposition on top of rustfft with plans held per shape,
//! plus the zero-padding and `roll` primitives the filters and correlation
//! estimators share.

use std::sync::Arc;

use ndarray::{Array, Array2, ArrayView, ArrayView2, Axis, Dimension, Slice};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

/// Forward and inverse FFT plans for one (rows, cols) shape
#[derive(Clone)]
pub struct Fft2Plan {
    shape: (usize, usize),
    row_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl Fft2Plan {
    /// Plan transforms for arrays of the given (rows, cols) shape
    pub fn new(shape: (usize, usize)) -> Self {
        let (rows, cols) = shape;
        let mut planner = FftPlanner::<f64>::new();
        Self {
            shape,
            row_forward: planner.plan_fft_forward(cols),
            row_inverse: planner.plan_fft_inverse(cols),
            col_forward: planner.plan_fft_forward(rows),
            col_inverse: planner.plan_fft_inverse(rows),
        }
    }

    /// Shape the plans were built for
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Unnormalized forward transform, in place
    pub fn forward(&self, data: &mut Array2<Complex64>) {
        debug_assert_eq!(data.dim(), self.shape);
        transform(data, &self.row_forward, &self.col_forward);
    }

    /// Inverse transform normalized by 1/(rows*cols), in place
    pub fn inverse(&self, data: &mut Array2<Complex64>) {
        debug_assert_eq!(data.dim(), self.shape);
        transform(data, &self.row_inverse, &self.col_inverse);
        let norm = 1.0 / (self.shape.0 * self.shape.1) as f64;
        data.mapv_inplace(|v| v * norm);
    }

    /// Forward transform of a real image
    pub fn forward_real(&self, image: &ArrayView2<f64>) -> Array2<Complex64> {
        let mut spectrum = image.mapv(|v| Complex64::new(v, 0.0));
        self.forward(&mut spectrum);
        spectrum
    }

    /// Forward transform of `kernel` zero-padded to the plan shape.
    ///
    /// The kernel occupies the top-left corner of the padded array.
    pub fn forward_padded(&self, kernel: &ArrayView2<f64>) -> Array2<Complex64> {
        let (kh, kw) = kernel.dim();
        let mut padded = Array2::<Complex64>::zeros(self.shape);
        padded
            .slice_mut(ndarray::s![..kh, ..kw])
            .zip_mut_with(kernel, |p, &k| *p = Complex64::new(k, 0.0));
        self.forward(&mut padded);
        padded
    }

    /// Inverse transform keeping only the real part
    pub fn inverse_real(&self, mut spectrum: Array2<Complex64>) -> Array2<f64> {
        self.inverse(&mut spectrum);
        spectrum.mapv(|v| v.re)
    }
}

impl std::fmt::Debug for Fft2Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft2Plan").field("shape", &self.shape).finish()
    }
}

// Rows first, then columns, through a reusable buffer
fn transform(
    data: &mut Array2<Complex64>,
    row_fft: &Arc<dyn Fft<f64>>,
    col_fft: &Arc<dyn Fft<f64>>,
) {
    let (rows, cols) = data.dim();

    let mut row_buf = vec![Complex64::new(0.0, 0.0); cols];
    for mut row in data.rows_mut() {
        row_buf.iter_mut().zip(row.iter()).for_each(|(b, &v)| *b = v);
        row_fft.process(&mut row_buf);
        row.iter_mut().zip(&row_buf).for_each(|(v, &b)| *v = b);
    }

    let mut col_buf = vec![Complex64::new(0.0, 0.0); rows];
    for mut col in data.columns_mut() {
        col_buf.iter_mut().zip(col.iter()).for_each(|(b, &v)| *b = v);
        col_fft.process(&mut col_buf);
        col.iter_mut().zip(&col_buf).for_each(|(v, &b)| *v = b);
    }
}

/// Circularly shift `input` by `shift` positions along `axis`.
///
/// Matches numpy's `roll`: element `k` moves to `(k + shift) mod n`.
pub fn roll<D: Dimension>(input: &ArrayView<f64, D>, axis: Axis, shift: isize) -> Array<f64, D> {
    let n = input.len_of(axis);
    let mut out = input.to_owned();
    if n == 0 {
        return out;
    }

    let k = shift.rem_euclid(n as isize) as usize;
    if k == 0 {
        return out;
    }

    out.slice_axis_mut(axis, Slice::from(k..))
        .assign(&input.slice_axis(axis, Slice::from(..n - k)));
    out.slice_axis_mut(axis, Slice::from(..k))
        .assign(&input.slice_axis(axis, Slice::from(n - k..)));
    out
}

/// Circularly shift a 2D array along both axes
pub fn roll2(input: &ArrayView2<f64>, rows: isize, cols: isize) -> Array2<f64> {
    let shifted = roll(input, Axis(0), rows);
    roll(&shifted.view(), Axis(1), cols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2, Array3};

    #[test]
    fn test_roll_matches_numpy() {
        let a = arr1(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(roll(&a.view(), Axis(0), 2), arr1(&[3.0, 4.0, 0.0, 1.0, 2.0]));
        assert_eq!(roll(&a.view(), Axis(0), -1), arr1(&[1.0, 2.0, 3.0, 4.0, 0.0]));
        assert_eq!(roll(&a.view(), Axis(0), 5), a);
    }

    #[test]
    fn test_roll_single_axis_of_stack() {
        let stack = Array3::from_shape_fn((2, 3, 3), |(t, i, j)| (t * 9 + i * 3 + j) as f64);
        let rolled = roll(&stack.view(), Axis(1), 1);

        // Rows move down by one, columns and frames untouched
        assert_eq!(rolled[[0, 1, 0]], stack[[0, 0, 0]]);
        assert_eq!(rolled[[0, 0, 2]], stack[[0, 2, 2]]);
        assert_eq!(rolled[[1, 2, 1]], stack[[1, 1, 1]]);
    }

    #[test]
    fn test_roll2() {
        let a = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let rolled = roll2(&a.view(), 1, -1);
        assert_eq!(rolled, arr2(&[[5.0, 6.0, 4.0], [2.0, 3.0, 1.0]]));
    }

    #[test]
    fn test_fft_roundtrip() {
        let image = Array2::from_shape_fn((6, 9), |(i, j)| ((i * 7 + j * 3) % 5) as f64 - 1.5);
        let plan = Fft2Plan::new(image.dim());

        let spectrum = plan.forward_real(&image.view());
        let back = plan.inverse_real(spectrum);

        for (a, b) in image.iter().zip(back.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_fft_of_impulse_is_flat() {
        let mut image = Array2::<f64>::zeros((4, 4));
        image[[0, 0]] = 1.0;
        let plan = Fft2Plan::new((4, 4));

        let spectrum = plan.forward_real(&image.view());
        for v in spectrum.iter() {
            assert_relative_eq!(v.re, 1.0, epsilon = 1e-12);
            assert_relative_eq!(v.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_padded_dc_term_is_kernel_sum() {
        let kernel = arr2(&[[0.1, 0.2], [0.3, 0.4]]);
        let plan = Fft2Plan::new((5, 5));

        let otf = plan.forward_padded(&kernel.view());
        assert_eq!(otf.dim(), (5, 5));
        assert_relative_eq!(otf[[0, 0]].re, 1.0, epsilon = 1e-12);
    }
}
