//! Candidate generators that do not require strict local maxima.
use std::collections::BTreeSet;

use super::GridPeak;
use crate::coords::LatLon;
use crate::reconcile::CoordinateReconciler;
use crate::window::ElevationWindow;

/// The `n` highest valid cells by raw elevation (every valid cell for `None`).
///
/// Ties break by row, then column, so the order is fully determined.
pub fn top_n_cells(window: &ElevationWindow, n: Option<usize>) -> Vec<GridPeak> {
    let mut peaks: Vec<GridPeak> = (0..window.height())
        .flat_map(|row| (0..window.width()).map(move |col| (row, col)))
        .filter_map(|(row, col)| window.value(row, col).map(|elevation| GridPeak { row, col, elevation }))
        .collect();
    peaks.sort_by(|a, b| {
        b.elevation
            .total_cmp(&a.elevation)
            .then_with(|| a.row.cmp(&b.row))
            .then_with(|| a.col.cmp(&b.col))
    });
    if let Some(n) = n {
        peaks.truncate(n);
    }
    peaks
}

/// Most lattice steps taken on each side of the centre.
pub const MAX_GRID_STEPS: f64 = 200.0;

/// Lattice spacing actually used: `step_m`, widened so at most
/// [`MAX_GRID_STEPS`] steps fit in `radius_m`.
pub fn effective_step(radius_m: f64, step_m: f64) -> f64 {
    step_m.max(radius_m / MAX_GRID_STEPS)
}

/// Valid cells under a regular metric grid of spacing `step_m` around
/// `center`, restricted to `radius_m`. Cells hit twice are kept once, in
/// first-hit order (south-west to north-east).
pub fn grid_sample(
    window: &ElevationWindow,
    reconciler: &CoordinateReconciler,
    center: LatLon,
    radius_m: f64,
    step_m: f64,
) -> Vec<GridPeak> {
    if !(step_m > 0.0) || !(radius_m > 0.0) {
        return Vec::new();
    }
    let step_m = effective_step(radius_m, step_m);
    let steps = (radius_m / step_m).floor() as i64;
    let mut seen = BTreeSet::new();
    let mut peaks = Vec::new();
    for i in -steps..=steps {
        for j in -steps..=steps {
            let p = center.offset_m(i as f64 * step_m, j as f64 * step_m);
            if center.distance_m(p) > radius_m {
                continue;
            }
            let Some((row, col)) = reconciler.latlon_to_cell(window, p) else {
                continue;
            };
            if let Some(elevation) = window.value(row, col) {
                if seen.insert((row, col)) {
                    peaks.push(GridPeak { row, col, elevation });
                }
            }
        }
    }
    peaks
}
