//! Numerical algorithms for the forward model
//!
//! This module provides the quadrature used to integrate continuous PSF
//! densities over pixels.

pub mod quadrature;

pub use quadrature::{integrate, integrate_rectangle, QuadratureError};
