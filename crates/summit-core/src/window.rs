use crate::coords::METRES_PER_DEGREE;
use crate::error::{Result, SummitError};
use crate::geotransform::GeoTransform;
use crate::reconcile::Crs;

/// Minimum usable window edge, cells.
pub const MIN_WINDOW_CELLS: usize = 3;

/// An in-memory elevation grid read for one detection request.
///
/// Elevations are f32 metres, row-major, row 0 = north edge. Validity is an
/// explicit per-cell bitmap: a masked cell's elevation value is meaningless.
#[derive(Debug, Clone)]
pub struct ElevationWindow {
    data: Vec<f32>,
    valid: Vec<bool>,
    width: usize,
    height: usize,
    transform: GeoTransform,
    crs: Crs,
    cell_size_m: f64,
}

impl ElevationWindow {
    /// Build a window from parallel value / validity buffers.
    ///
    /// Non-finite values are forced invalid.
    pub fn new(
        data: Vec<f32>,
        mut valid: Vec<bool>,
        width: usize,
        height: usize,
        transform: GeoTransform,
        crs: Crs,
        cell_size_m: f64,
    ) -> Result<Self> {
        if data.len() != width * height || valid.len() != data.len() {
            return Err(SummitError::InvalidInput(format!(
                "window buffers ({} values, {} mask) do not match {width}x{height}",
                data.len(),
                valid.len()
            )));
        }
        for (v, ok) in data.iter().zip(valid.iter_mut()) {
            if !v.is_finite() {
                *ok = false;
            }
        }
        Ok(Self { data, valid, width, height, transform, crs, cell_size_m })
    }

    /// Build a window by evaluating `f(row, col)`; `None` marks a no-data cell.
    pub fn from_fn(
        width: usize,
        height: usize,
        transform: GeoTransform,
        crs: Crs,
        cell_size_m: f64,
        mut f: impl FnMut(usize, usize) -> Option<f32>,
    ) -> Self {
        let mut data = Vec::with_capacity(width * height);
        let mut valid = Vec::with_capacity(width * height);
        for r in 0..height {
            for c in 0..width {
                match f(r, c) {
                    Some(v) if v.is_finite() => {
                        data.push(v);
                        valid.push(true);
                    }
                    _ => {
                        data.push(0.0);
                        valid.push(false);
                    }
                }
            }
        }
        Self { data, valid, width, height, transform, crs, cell_size_m }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Approximate east-west ground size of one cell, metres.
    pub fn cell_size_m(&self) -> f64 {
        self.cell_size_m
    }

    /// North-south ground size of one cell, metres. Unlike the east-west
    /// size, a degree of latitude does not shrink towards the poles.
    pub fn cell_height_m(&self) -> f64 {
        let h = self.transform.pixel_height.abs();
        if self.crs.is_geographic() { h * METRES_PER_DEGREE } else { h }
    }

    #[inline]
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid[row * self.width + col]
    }

    /// Elevation of a valid cell, `None` if masked.
    #[inline]
    pub fn value(&self, row: usize, col: usize) -> Option<f32> {
        let i = row * self.width + col;
        if self.valid[i] { Some(self.data[i]) } else { None }
    }

    /// Elevation at `(row + dr, col + dc)`, `None` when outside the grid or masked.
    pub fn value_at_offset(&self, row: usize, col: usize, dr: isize, dc: isize) -> Option<f32> {
        let r = row as isize + dr;
        let c = col as isize + dc;
        if r < 0 || c < 0 || r >= self.height as isize || c >= self.width as isize {
            return None;
        }
        self.value(r as usize, c as usize)
    }

    pub fn values(&self) -> &[f32] {
        &self.data
    }

    pub fn mask(&self) -> &[bool] {
        &self.valid
    }

    /// Highest valid cell as `(row, col, elevation)`; first in row-major order on ties.
    pub fn max_cell(&self) -> Option<(usize, usize, f32)> {
        let mut best: Option<(usize, usize, f32)> = None;
        for r in 0..self.height {
            for c in 0..self.width {
                if let Some(v) = self.value(r, c) {
                    if best.map_or(true, |(_, _, b)| v > b) {
                        best = Some((r, c, v));
                    }
                }
            }
        }
        best
    }

    /// Inclusive row/col ranges of a square of half-size `half` around a cell,
    /// clipped to the grid.
    pub fn clip_square(&self, row: usize, col: usize, half: usize) -> (usize, usize, usize, usize) {
        self.clip_rect(row, col, half, half)
    }

    /// Like [`clip_square`](Self::clip_square) with separate row and column half-sizes.
    pub fn clip_rect(&self, row: usize, col: usize, half_rows: usize, half_cols: usize) -> (usize, usize, usize, usize) {
        let r0 = row.saturating_sub(half_rows);
        let c0 = col.saturating_sub(half_cols);
        let r1 = (row + half_rows).min(self.height - 1);
        let c1 = (col + half_cols).min(self.width - 1);
        (r0, r1, c0, c1)
    }
}
