//! Affine grid ↔ native coordinate mapping.

use serde::{Deserialize, Serialize};

/// Affine coefficients mapping fractional grid positions to native coordinates:
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// `(origin_x, origin_y)` is the outer corner of cell (0, 0). For north-up
/// grids the rotations are 0 and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    #[serde(default)]
    pub row_rotation: f64,
    #[serde(default)]
    pub col_rotation: f64,
}

impl GeoTransform {
    /// North-up transform without rotation.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Native coordinates of the centre of cell `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.apply(row as f64 + 0.5, col as f64 + 0.5)
    }

    /// Native coordinates of a fractional grid position (corner convention).
    pub fn apply(&self, row: f64, col: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }

    /// Fractional `(row, col)` of a native point; `None` for a degenerate transform.
    pub fn invert(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det.abs() < 1e-15 {
            return None;
        }
        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;
        Some((row, col))
    }

    /// Transform of the sub-grid whose cell (0, 0) is this grid's `(row0, col0)`.
    pub fn window(&self, row0: usize, col0: usize) -> Self {
        let (origin_x, origin_y) = self.apply(row0 as f64, col0 as f64);
        Self { origin_x, origin_y, ..*self }
    }

    /// Cell width in native units (square cells assumed).
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
