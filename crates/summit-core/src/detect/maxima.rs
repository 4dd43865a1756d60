//! Local maximum detection on an elevation window.
//!
//! A cell is a local maximum iff it is valid and its (optionally smoothed)
//! value equals the maximum of the valid cells in the square neighbourhood
//! centred on it. Plateau ties are all kept; ranking breaks them later.
use std::collections::BTreeSet;

use super::smoothing::masked_gaussian;
use super::GridPeak;
use crate::window::ElevationWindow;

/// Square maximum filter of odd edge `size`; masked cells are `NEG_INFINITY`
/// in `surface` and never win. Separable: row pass, then column pass.
fn maximum_filter(surface: &[f32], width: usize, height: usize, size: usize) -> Vec<f32> {
    let half = size / 2;

    let mut rows = vec![f32::NEG_INFINITY; surface.len()];
    for r in 0..height {
        for c in 0..width {
            let lo = c.saturating_sub(half);
            let hi = (c + half).min(width - 1);
            rows[r * width + c] = surface[r * width + lo..=r * width + hi]
                .iter()
                .cloned()
                .fold(f32::NEG_INFINITY, f32::max);
        }
    }

    let mut out = vec![f32::NEG_INFINITY; surface.len()];
    for r in 0..height {
        let lo = r.saturating_sub(half);
        let hi = (r + half).min(height - 1);
        for c in 0..width {
            out[r * width + c] = (lo..=hi).map(|rr| rows[rr * width + c]).fold(f32::NEG_INFINITY, f32::max);
        }
    }
    out
}

fn odd_size(size: usize) -> usize {
    let s = size.max(1);
    if s % 2 == 0 { s + 1 } else { s }
}

/// Cells of `surface` that equal their neighbourhood maximum, row-major.
fn maxima_cells(window: &ElevationWindow, surface: &[f32], size: usize) -> Vec<(usize, usize)> {
    let (w, h) = (window.width(), window.height());
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let filtered = maximum_filter(surface, w, h, odd_size(size));
    let mut cells = Vec::new();
    for r in 0..h {
        for c in 0..w {
            let i = r * w + c;
            if window.is_valid(r, c) && surface[i].is_finite() && surface[i] == filtered[i] {
                cells.push((r, c));
            }
        }
    }
    cells
}

fn to_peaks(window: &ElevationWindow, cells: impl IntoIterator<Item = (usize, usize)>) -> Vec<GridPeak> {
    cells
        .into_iter()
        .filter_map(|(row, col)| window.value(row, col).map(|elevation| GridPeak { row, col, elevation }))
        .collect()
}

/// Local maxima for one neighbourhood size.
///
/// `smoothing_sigma` (cells) ≤ 0 disables smoothing. Even sizes are rounded up
/// to the next odd size. Reported elevations are the raw, unsmoothed values.
pub fn find_candidates(window: &ElevationWindow, neighborhood_size: usize, smoothing_sigma: f64) -> Vec<GridPeak> {
    let surface = masked_gaussian(window, smoothing_sigma);
    to_peaks(window, maxima_cells(window, &surface, neighborhood_size))
}

/// Union of the local maxima over several neighbourhood sizes, plus the
/// window's global maximum, deduplicated by cell and returned row-major.
pub fn find_candidates_multiscale(window: &ElevationWindow, sizes: &[usize], smoothing_sigma: f64) -> Vec<GridPeak> {
    let surface = masked_gaussian(window, smoothing_sigma);
    let mut cells: BTreeSet<(usize, usize)> = BTreeSet::new();
    for &size in sizes {
        cells.extend(maxima_cells(window, &surface, size));
    }
    if let Some((r, c, _)) = window.max_cell() {
        cells.insert((r, c));
    }
    to_peaks(window, cells)
}
