//! Window and domain shapes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of a small centered window or operating domain.
///
/// Stored row-major like ndarray: rows (vertical extent) come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowShape {
    /// Number of rows
    pub rows: usize,
    /// Number of columns
    pub cols: usize,
}

impl WindowShape {
    /// Create a new WindowShape
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Square window with the same extent on both axes
    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }

    /// Shape of an existing 2D array
    pub fn of<S>(array: &ndarray::ArrayBase<S, ndarray::Ix2>) -> Self
    where
        S: ndarray::Data,
    {
        array.dim().into()
    }

    /// Get total number of cells
    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// True when either axis is zero
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// True when both axes have an odd extent, so the window has a center cell
    pub fn is_odd(&self) -> bool {
        self.rows % 2 == 1 && self.cols % 2 == 1
    }

    /// Index of the center cell
    pub fn center(&self) -> (usize, usize) {
        (self.rows / 2, self.cols / 2)
    }

    /// Signed offset of cell (i, j) relative to the center cell
    pub fn offset(&self, i: usize, j: usize) -> (isize, isize) {
        let (ci, cj) = self.center();
        (i as isize - ci as isize, j as isize - cj as isize)
    }

    /// Larger of the two extents
    pub fn max_extent(&self) -> usize {
        self.rows.max(self.cols)
    }

    /// Convert to tuple (rows, cols)
    pub fn to_tuple(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

impl Default for WindowShape {
    fn default() -> Self {
        Self::square(5)
    }
}

impl From<(usize, usize)> for WindowShape {
    fn from(dimensions: (usize, usize)) -> Self {
        Self::new(dimensions.0, dimensions.1)
    }
}

impl From<WindowShape> for (usize, usize) {
    fn from(shape: WindowShape) -> Self {
        shape.to_tuple()
    }
}

impl fmt::Display for WindowShape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_offsets_are_centered() {
        let shape = WindowShape::new(3, 5);
        assert_eq!(shape.center(), (1, 2));
        assert_eq!(shape.offset(0, 0), (-1, -2));
        assert_eq!(shape.offset(1, 2), (0, 0));
        assert_eq!(shape.offset(2, 4), (1, 2));
    }

    #[test]
    fn test_of_array() {
        let array = Array2::<f64>::zeros((4, 7));
        let shape = WindowShape::of(&array);
        assert_eq!(shape.to_tuple(), (4, 7));
        assert!(!shape.is_odd());
        assert_eq!(shape.cell_count(), 28);
    }

    #[test]
    fn test_display_and_serde() {
        let shape = WindowShape::square(5);
        assert_eq!(shape.to_string(), "5x5");

        let json = serde_json::to_string(&shape).unwrap();
        let back: WindowShape = serde_json::from_str(&json).unwrap();
        assert_eq!(back, shape);
    }
}
