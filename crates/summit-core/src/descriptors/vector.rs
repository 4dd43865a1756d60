//! Terrain descriptor vector: the fixed 16-feature classifier input.
//!
//! Features are computed over a feature sub-window centred on the candidate
//! and clipped to the request window. Its half-size is
//! `round(feature_radius / cell)` cells, taken per axis so that geographic
//! grids (narrower east-west than north-south) still cover a ground square:
//!
//! - `elev_rank`: fraction of valid cells ≤ candidate (1.0 = highest)
//! - `gradient_*`: elevation drop to the sample `max(1, round(r / 5 / cell))`
//!   cells away along each axis in each compass direction; 0.0 when the
//!   sample is outside the sub-window or masked
//! - `min_gradient`, `mean_gradient`, `grad_variance`: over the 8 drops
//! - `local_relief`: max − min valid elevation
//! - `pct_lower`: fraction of valid cells strictly lower
//! - `curvature`: −∇²z over the 4-neighbours, each axis scaled by its own
//!   cell size; 0.0 on the sub-window edge or next to a masked cell
//! - `dist_to_seed`: haversine metres to the seed, 0.0 without one
use serde::Serialize;

use super::DIRECTIONS;
use crate::coords::{haversine_m, LatLon};
use crate::error::{Result, SummitError};
use crate::window::{ElevationWindow, MIN_WINDOW_CELLS};

pub const FEATURE_COUNT: usize = 16;

/// Classifier input layout. Order is a stable contract.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "elev_rank",
    "gradient_N",
    "gradient_S",
    "gradient_E",
    "gradient_W",
    "gradient_NE",
    "gradient_SE",
    "gradient_SW",
    "gradient_NW",
    "min_gradient",
    "mean_gradient",
    "grad_variance",
    "local_relief",
    "pct_lower",
    "curvature",
    "dist_to_seed",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TerrainDescriptorVector {
    pub elev_rank: f64,
    #[serde(rename = "gradient_N")]
    pub gradient_n: f64,
    #[serde(rename = "gradient_S")]
    pub gradient_s: f64,
    #[serde(rename = "gradient_E")]
    pub gradient_e: f64,
    #[serde(rename = "gradient_W")]
    pub gradient_w: f64,
    #[serde(rename = "gradient_NE")]
    pub gradient_ne: f64,
    #[serde(rename = "gradient_SE")]
    pub gradient_se: f64,
    #[serde(rename = "gradient_SW")]
    pub gradient_sw: f64,
    #[serde(rename = "gradient_NW")]
    pub gradient_nw: f64,
    pub min_gradient: f64,
    pub mean_gradient: f64,
    pub grad_variance: f64,
    pub local_relief: f64,
    pub pct_lower: f64,
    pub curvature: f64,
    pub dist_to_seed: f64,
}

impl TerrainDescriptorVector {
    /// Values in [`FEATURE_NAMES`] order.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.elev_rank,
            self.gradient_n,
            self.gradient_s,
            self.gradient_e,
            self.gradient_w,
            self.gradient_ne,
            self.gradient_se,
            self.gradient_sw,
            self.gradient_nw,
            self.min_gradient,
            self.mean_gradient,
            self.grad_variance,
            self.local_relief,
            self.pct_lower,
            self.curvature,
            self.dist_to_seed,
        ]
    }

    /// The eight directional drops in N, S, E, W, NE, SE, SW, NW order.
    pub fn gradients(&self) -> [f64; 8] {
        [
            self.gradient_n,
            self.gradient_s,
            self.gradient_e,
            self.gradient_w,
            self.gradient_ne,
            self.gradient_se,
            self.gradient_sw,
            self.gradient_nw,
        ]
    }
}

/// Feature sub-window half-size in cells.
pub fn feature_half_cells(feature_radius_m: f64, cell_size_m: f64) -> usize {
    ((feature_radius_m / cell_size_m.max(1e-9)).round() as usize).max(1)
}

/// Gradient sampling distance in cells: one fifth of the feature radius.
pub fn gradient_distance_cells(feature_radius_m: f64, cell_size_m: f64) -> usize {
    ((feature_radius_m / 5.0 / cell_size_m.max(1e-9)).round() as usize).max(1)
}

/// Compute the descriptor vector of window cell `(row, col)`.
///
/// `position` is the cell's WGS84 location, used for `dist_to_seed`.
pub fn extract_descriptors(
    window: &ElevationWindow,
    row: usize,
    col: usize,
    feature_radius_m: f64,
    position: LatLon,
    seed: Option<LatLon>,
) -> Result<TerrainDescriptorVector> {
    let (cell_x, cell_y) = (window.cell_size_m(), window.cell_height_m());
    let half_rows = feature_half_cells(feature_radius_m, cell_y);
    let half_cols = feature_half_cells(feature_radius_m, cell_x);
    let (r0, r1, c0, c1) = window.clip_rect(row, col, half_rows, half_cols);
    let (sub_w, sub_h) = (c1 - c0 + 1, r1 - r0 + 1);
    if sub_w < MIN_WINDOW_CELLS || sub_h < MIN_WINDOW_CELLS {
        return Err(SummitError::WindowTooSmall { width: sub_w, height: sub_h });
    }

    let mut n_valid = 0usize;
    let mut min_elev = f32::INFINITY;
    let mut max_elev = f32::NEG_INFINITY;
    for r in r0..=r1 {
        for c in c0..=c1 {
            if let Some(v) = window.value(r, c) {
                n_valid += 1;
                min_elev = min_elev.min(v);
                max_elev = max_elev.max(v);
            }
        }
    }
    if n_valid == 0 {
        return Err(SummitError::NoData);
    }

    let center = window.value(row, col).ok_or(SummitError::CenterMasked { row, col })?;

    let (mut n_le, mut n_lt) = (0usize, 0usize);
    for r in r0..=r1 {
        for c in c0..=c1 {
            if let Some(v) = window.value(r, c) {
                if v <= center {
                    n_le += 1;
                }
                if v < center {
                    n_lt += 1;
                }
            }
        }
    }

    // Directional drops, restricted to the sub-window.
    let dist_rows = gradient_distance_cells(feature_radius_m, cell_y) as isize;
    let dist_cols = gradient_distance_cells(feature_radius_m, cell_x) as isize;
    let mut g = [0.0f64; 8];
    for (k, &(dr, dc)) in DIRECTIONS.iter().enumerate() {
        let tr = row as isize + dr * dist_rows;
        let tc = col as isize + dc * dist_cols;
        let inside = tr >= r0 as isize && tr <= r1 as isize && tc >= c0 as isize && tc <= c1 as isize;
        if inside {
            if let Some(v) = window.value(tr as usize, tc as usize) {
                g[k] = center as f64 - v as f64;
            }
        }
    }
    let min_gradient = g.iter().cloned().fold(f64::INFINITY, f64::min);
    let mean_gradient = g.iter().sum::<f64>() / 8.0;
    let grad_variance = g.iter().map(|v| (v - mean_gradient).powi(2)).sum::<f64>() / 8.0;

    let curvature = laplacian_curvature(window, row, col, (r0, r1, c0, c1), center, (cell_x, cell_y));

    let dist_to_seed = seed.map_or(0.0, |s| haversine_m(position, s));

    Ok(TerrainDescriptorVector {
        elev_rank: n_le as f64 / n_valid as f64,
        gradient_n: g[0],
        gradient_s: g[1],
        gradient_e: g[2],
        gradient_w: g[3],
        gradient_ne: g[4],
        gradient_se: g[5],
        gradient_sw: g[6],
        gradient_nw: g[7],
        min_gradient,
        mean_gradient,
        grad_variance,
        local_relief: (max_elev - min_elev) as f64,
        pct_lower: n_lt as f64 / n_valid as f64,
        curvature,
        dist_to_seed,
    })
}

/// Negated discrete Laplacian; positive on convex (summit-like) cells.
fn laplacian_curvature(
    window: &ElevationWindow,
    row: usize,
    col: usize,
    (r0, r1, c0, c1): (usize, usize, usize, usize),
    center: f32,
    (cell_x, cell_y): (f64, f64),
) -> f64 {
    if row <= r0 || row >= r1 || col <= c0 || col >= c1 {
        return 0.0;
    }
    let (Some(n), Some(s), Some(w), Some(e)) = (
        window.value(row - 1, col),
        window.value(row + 1, col),
        window.value(row, col - 1),
        window.value(row, col + 1),
    ) else {
        return 0.0;
    };
    let z = center as f64;
    let d2y = (n as f64 + s as f64 - 2.0 * z) / (cell_y * cell_y);
    let d2x = (w as f64 + e as f64 - 2.0 * z) / (cell_x * cell_x);
    -(d2x + d2y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geotransform::GeoTransform;
    use crate::reconcile::Crs;
    use approx::assert_relative_eq;

    const CELL: f64 = 10.0;

    fn window(w: usize, h: usize, f: impl FnMut(usize, usize) -> Option<f32>) -> ElevationWindow {
        ElevationWindow::from_fn(w, h, GeoTransform::new(0.0, 0.0, CELL, -CELL), Crs::Projected { epsg: 3857 }, CELL, f)
    }

    fn pyramid() -> ElevationWindow {
        window(21, 21, |r, c| {
            let d = (r as i32 - 10).abs().max((c as i32 - 10).abs());
            Some(500.0 - 5.0 * d as f32)
        })
    }

    fn origin() -> LatLon {
        LatLon::new(0.0, 0.0)
    }

    #[test]
    fn names_match_array_layout() {
        assert_eq!(FEATURE_NAMES.len(), FEATURE_COUNT);
        let v = extract_descriptors(&pyramid(), 10, 10, 50.0, origin(), None).unwrap();
        let json = serde_json::to_value(v).unwrap();
        let arr = v.to_array();
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            assert_eq!(json[name].as_f64().unwrap(), arr[i], "{name}");
        }
    }

    #[test]
    fn pyramid_apex_descriptors() {
        let v = extract_descriptors(&pyramid(), 10, 10, 50.0, origin(), None).unwrap();
        assert_eq!(v.elev_rank, 1.0);
        // 50 m / 5 / 10 m = 1 cell → every drop is 5 m.
        for g in v.gradients() {
            assert_relative_eq!(g, 5.0);
        }
        assert_relative_eq!(v.min_gradient, 5.0);
        assert_relative_eq!(v.grad_variance, 0.0);
        // Sub-window ±5 cells: relief 25 m, 120 of 121 cells lower.
        assert_relative_eq!(v.local_relief, 25.0);
        assert_relative_eq!(v.pct_lower, 120.0 / 121.0);
        assert!(v.curvature > 0.0);
        assert_eq!(v.dist_to_seed, 0.0);
    }

    #[test]
    fn ridge_has_two_flat_directions() {
        // Ridge along the N–S axis (column 10), falling east and west.
        let w = window(21, 21, |_, c| Some(300.0 - 4.0 * (c as i32 - 10).abs() as f32));
        let v = extract_descriptors(&w, 10, 10, 50.0, origin(), None).unwrap();
        assert_relative_eq!(v.gradient_n, 0.0);
        assert_relative_eq!(v.gradient_s, 0.0);
        for g in [v.gradient_e, v.gradient_w, v.gradient_ne, v.gradient_se, v.gradient_sw, v.gradient_nw] {
            assert!(g > 3.0, "{g}");
        }
        assert_relative_eq!(v.min_gradient, 0.0);
        assert!(v.grad_variance > 0.0);
    }

    #[test]
    fn edge_samples_contribute_zero() {
        // Candidate on the north edge: N, NE, NW samples fall outside.
        let v = extract_descriptors(&pyramid(), 0, 10, 50.0, origin(), None).unwrap();
        assert_eq!(v.gradient_n, 0.0);
        assert_eq!(v.gradient_ne, 0.0);
        assert_eq!(v.gradient_nw, 0.0);
        assert_eq!(v.curvature, 0.0);
        assert!(v.to_array().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn masked_sample_contributes_zero() {
        let w = window(21, 21, |r, c| {
            if r == 10 && c == 11 {
                None
            } else {
                Some(100.0 - ((r as i32 - 10).abs() + (c as i32 - 10).abs()) as f32)
            }
        });
        let v = extract_descriptors(&w, 10, 10, 50.0, origin(), None).unwrap();
        assert_eq!(v.gradient_e, 0.0);
        assert_eq!(v.gradient_w, 1.0);
        // East neighbour masked → curvature undefined.
        assert_eq!(v.curvature, 0.0);
    }

    #[test]
    fn masked_center_drops_candidate() {
        let w = window(9, 9, |r, c| if r == 4 && c == 4 { None } else { Some(1.0) });
        assert!(matches!(
            extract_descriptors(&w, 4, 4, 30.0, origin(), None),
            Err(SummitError::CenterMasked { row: 4, col: 4 })
        ));
    }

    #[test]
    fn tiny_subwindow_is_too_small() {
        let w = window(2, 9, |_, _| Some(1.0));
        assert!(matches!(
            extract_descriptors(&w, 4, 0, 30.0, origin(), None),
            Err(SummitError::WindowTooSmall { width: 2, .. })
        ));
    }

    #[test]
    fn empty_subwindow_is_no_data() {
        // Valid data only far from the candidate's ±1-cell sub-window.
        let w = window(9, 9, |r, c| if r == 8 && c == 8 { Some(1.0) } else { None });
        assert!(matches!(extract_descriptors(&w, 1, 1, 10.0, origin(), None), Err(SummitError::NoData)));
    }

    #[test]
    fn seed_distance_is_haversine() {
        let seed = LatLon::new(0.001, 0.0);
        let v = extract_descriptors(&pyramid(), 10, 10, 50.0, origin(), Some(seed)).unwrap();
        assert_relative_eq!(v.dist_to_seed, haversine_m(origin(), seed));
    }

    #[test]
    fn geographic_subwindow_covers_ground_square() {
        // 1 arc-second grid at 60°N: cells are ~31 m tall but only ~15 m wide,
        // so 60 m spans 2 rows but 4 columns.
        let px = 1.0 / 3600.0;
        let lat = 60.0f64;
        let cell_x = px * crate::coords::METRES_PER_DEGREE * lat.to_radians().cos();
        let w = ElevationWindow::from_fn(
            21,
            21,
            GeoTransform::new(10.0, lat, px, -px),
            Crs::Geographic,
            cell_x,
            |r, c| {
                let d = (r as i32 - 10).abs() + (c as i32 - 10).abs();
                Some(500.0 - d as f32)
            },
        );
        assert!(w.cell_height_m() > 1.9 * w.cell_size_m());
        assert_eq!(feature_half_cells(60.0, w.cell_height_m()), 2);
        assert_eq!(feature_half_cells(60.0, w.cell_size_m()), 4);

        let v = extract_descriptors(&w, 10, 10, 60.0, origin(), None).unwrap();
        // 5 rows × 9 columns; only the apex is not lower.
        assert_relative_eq!(v.pct_lower, 44.0 / 45.0);
        // Relief reaches the corner at (±2, ±4).
        assert_relative_eq!(v.local_relief, 6.0);
        // Gradient step: 12 m → 1 cell on both axes here.
        assert_relative_eq!(v.gradient_n, 1.0);
        assert_relative_eq!(v.gradient_e, 1.0);
    }
}
