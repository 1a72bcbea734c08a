//! Adaptive Simpson quadrature in one and two dimensions

use thiserror::Error;

/// Recursion limit for interval bisection
pub const MAX_DEPTH: usize = 48;

/// Errors that can occur during numerical integration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QuadratureError {
    #[error("Integration bounds must be finite, got [{lower}, {upper}]")]
    NonFiniteBounds { lower: f64, upper: f64 },

    #[error("Lower bound {lower} is above upper bound {upper}")]
    ReversedBounds { lower: f64, upper: f64 },

    #[error("Tolerance must be finite and positive, got {0}")]
    InvalidTolerance(f64),
}

fn validate_bounds(lower: f64, upper: f64) -> Result<(), QuadratureError> {
    if !lower.is_finite() || !upper.is_finite() {
        return Err(QuadratureError::NonFiniteBounds { lower, upper });
    }
    if lower > upper {
        return Err(QuadratureError::ReversedBounds { lower, upper });
    }
    Ok(())
}

fn validate_tolerance(tolerance: f64) -> Result<(), QuadratureError> {
    if !tolerance.is_finite() || tolerance <= 0.0 {
        return Err(QuadratureError::InvalidTolerance(tolerance));
    }
    Ok(())
}

struct Panel {
    a: f64,
    b: f64,
    fa: f64,
    fm: f64,
    fb: f64,
    whole: f64,
}

fn simpson(a: f64, b: f64, fa: f64, fm: f64, fb: f64) -> f64 {
    (b - a) / 6.0 * (fa + 4.0 * fm + fb)
}

fn refine<F>(f: &F, panel: Panel, tolerance: f64, depth: usize) -> f64
where
    F: Fn(f64) -> f64,
{
    let Panel {
        a,
        b,
        fa,
        fm,
        fb,
        whole,
    } = panel;
    let m = 0.5 * (a + b);
    let lm = 0.5 * (a + m);
    let rm = 0.5 * (m + b);
    let flm = f(lm);
    let frm = f(rm);
    let left = simpson(a, m, fa, flm, fm);
    let right = simpson(m, b, fm, frm, fb);
    let delta = left + right - whole;

    if depth == 0 || delta.abs() <= 15.0 * tolerance {
        // Richardson extrapolation of the two-level estimate
        return left + right + delta / 15.0;
    }

    refine(
        f,
        Panel {
            a,
            b: m,
            fa,
            fm: flm,
            fb: fm,
            whole: left,
        },
        0.5 * tolerance,
        depth - 1,
    ) + refine(
        f,
        Panel {
            a: m,
            b,
            fa: fm,
            fm: frm,
            fb,
            whole: right,
        },
        0.5 * tolerance,
        depth - 1,
    )
}

// Bounds and tolerance already validated
fn adaptive_simpson<F>(f: &F, lower: f64, upper: f64, tolerance: f64) -> f64
where
    F: Fn(f64) -> f64,
{
    if lower == upper {
        return 0.0;
    }
    let fa = f(lower);
    let fb = f(upper);
    let fm = f(0.5 * (lower + upper));
    let whole = simpson(lower, upper, fa, fm, fb);
    refine(
        f,
        Panel {
            a: lower,
            b: upper,
            fa,
            fm,
            fb,
            whole,
        },
        tolerance,
        MAX_DEPTH,
    )
}

/// Integrates `f` over `[lower, upper]` with adaptive Simpson's rule.
///
/// # Arguments
///
/// * `f` - The function to integrate
/// * `lower`, `upper` - Finite bounds with `lower <= upper`
/// * `tolerance` - Absolute error target for the whole interval
///
/// # Returns
///
/// The integral estimate, or an error for invalid bounds or tolerance.
pub fn integrate<F>(f: F, lower: f64, upper: f64, tolerance: f64) -> Result<f64, QuadratureError>
where
    F: Fn(f64) -> f64,
{
    validate_bounds(lower, upper)?;
    validate_tolerance(tolerance)?;
    Ok(adaptive_simpson(&f, lower, upper, tolerance))
}

/// Integrates `f(x, y)` over a rectangle with nested adaptive Simpson's rule.
///
/// The inner integral runs over x for each y sampled by the outer integral.
pub fn integrate_rectangle<F>(
    f: F,
    x_bounds: (f64, f64),
    y_bounds: (f64, f64),
    tolerance: f64,
) -> Result<f64, QuadratureError>
where
    F: Fn(f64, f64) -> f64,
{
    let (x0, x1) = x_bounds;
    let (y0, y1) = y_bounds;
    validate_bounds(x0, x1)?;
    validate_bounds(y0, y1)?;
    validate_tolerance(tolerance)?;

    // Keep inner error well below what the outer rule resolves
    let inner_tolerance = tolerance / (y1 - y0).max(1.0) * 1e-2;
    let inner = |y: f64| adaptive_simpson(&|x: f64| f(x, y), x0, x1, inner_tolerance);
    Ok(adaptive_simpson(&inner, y0, y1, tolerance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_polynomial_exact() {
        // Simpson is exact for cubics
        let result = integrate(|x| x * x * x - 2.0 * x + 1.0, 0.0, 2.0, 1e-12).unwrap();
        assert_relative_eq!(result, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_smooth_function() {
        let result = integrate(f64::sin, 0.0, PI, 1e-10).unwrap();
        assert_relative_eq!(result, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_kink() {
        let result = integrate(|x: f64| (-x.abs()).exp(), -1.0, 2.0, 1e-10).unwrap();
        let expected = 2.0 - (-1.0f64).exp() - (-2.0f64).exp();
        assert_relative_eq!(result, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_interval() {
        assert_eq!(integrate(|x| x, 1.5, 1.5, 1e-8).unwrap(), 0.0);
    }

    #[test]
    fn test_rectangle() {
        let result = integrate_rectangle(|x, y| x * y, (0.0, 1.0), (0.0, 2.0), 1e-10).unwrap();
        assert_relative_eq!(result, 1.0, epsilon = 1e-10);

        let result = integrate_rectangle(
            |x: f64, y: f64| (-(x.abs() + y.abs())).exp(),
            (-1.0, 1.0),
            (-1.0, 1.0),
            1e-10,
        )
        .unwrap();
        let side = 2.0 * (1.0 - (-1.0f64).exp());
        assert_relative_eq!(result, side * side, epsilon = 1e-8);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            integrate(|x| x, 1.0, 0.0, 1e-8),
            Err(QuadratureError::ReversedBounds { .. })
        ));
        assert!(matches!(
            integrate(|x| x, 0.0, f64::INFINITY, 1e-8),
            Err(QuadratureError::NonFiniteBounds { .. })
        ));
        assert!(matches!(
            integrate(|x| x, 0.0, 1.0, 0.0),
            Err(QuadratureError::InvalidTolerance(_))
        ));
        assert!(matches!(
            integrate_rectangle(|x, y| x + y, (0.0, 1.0), (2.0, 1.0), 1e-8),
            Err(QuadratureError::ReversedBounds { .. })
        ));
    }
}
