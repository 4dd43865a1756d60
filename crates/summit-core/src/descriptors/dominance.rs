//! Training-free dominance confidence.
//!
//! `radial` = fraction of the 8 compass samples (at a fixed pixel offset)
//! strictly lower than the candidate; `neighborhood` = fraction of valid cells
//! in a square neighbourhood strictly lower. Either score is 0.5 when it has
//! nothing to count.
use serde::Serialize;

use super::DIRECTIONS;
use crate::error::{Result, SummitError};
use crate::window::ElevationWindow;

pub const RADIAL_WEIGHT: f64 = 0.6;
pub const NEIGHBORHOOD_WEIGHT: f64 = 0.4;
/// Score used when no valid sample exists.
pub const NEUTRAL_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DominanceScore {
    pub radial: f64,
    pub neighborhood: f64,
    /// `0.6 · radial + 0.4 · neighborhood`, in [0, 1].
    pub combined: f64,
}

fn fraction(lower: usize, total: usize) -> f64 {
    if total == 0 { NEUTRAL_SCORE } else { lower as f64 / total as f64 }
}

/// Dominance of cell `(row, col)` over its surroundings.
///
/// `radial_offset` and `neighborhood_radius` are in cells (minimum 1).
pub fn dominance_confidence(
    window: &ElevationWindow,
    row: usize,
    col: usize,
    radial_offset: usize,
    neighborhood_radius: usize,
) -> Result<DominanceScore> {
    let center = window.value(row, col).ok_or(SummitError::CenterMasked { row, col })?;

    let offset = radial_offset.max(1) as isize;
    let (mut radial_lower, mut radial_total) = (0usize, 0usize);
    for &(dr, dc) in DIRECTIONS.iter() {
        if let Some(v) = window.value_at_offset(row, col, dr * offset, dc * offset) {
            radial_total += 1;
            if v < center {
                radial_lower += 1;
            }
        }
    }

    let (r0, r1, c0, c1) = window.clip_square(row, col, neighborhood_radius.max(1));
    let (mut hood_lower, mut hood_total) = (0usize, 0usize);
    for r in r0..=r1 {
        for c in c0..=c1 {
            if r == row && c == col {
                continue;
            }
            if let Some(v) = window.value(r, c) {
                hood_total += 1;
                if v < center {
                    hood_lower += 1;
                }
            }
        }
    }

    let radial = fraction(radial_lower, radial_total);
    let neighborhood = fraction(hood_lower, hood_total);
    Ok(DominanceScore {
        radial,
        neighborhood,
        combined: RADIAL_WEIGHT * radial + NEIGHBORHOOD_WEIGHT * neighborhood,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geotransform::GeoTransform;
    use crate::reconcile::Crs;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn window(w: usize, h: usize, f: impl FnMut(usize, usize) -> Option<f32>) -> ElevationWindow {
        ElevationWindow::from_fn(w, h, GeoTransform::default(), Crs::Geographic, 30.0, f)
    }

    #[test]
    fn isolated_cell_is_neutral() {
        let w = window(5, 5, |r, c| if r == 2 && c == 2 { Some(10.0) } else { None });
        let s = dominance_confidence(&w, 2, 2, 2, 2).unwrap();
        assert_eq!(s.radial, 0.5);
        assert_eq!(s.neighborhood, 0.5);
        assert_eq!(s.combined, 0.5);
    }

    #[test]
    fn masked_center_is_rejected() {
        let w = window(5, 5, |r, c| if r == 2 && c == 2 { None } else { Some(1.0) });
        assert!(matches!(dominance_confidence(&w, 2, 2, 1, 1), Err(SummitError::CenterMasked { row: 2, col: 2 })));
    }

    #[test]
    fn out_of_bounds_samples_are_ignored() {
        // Corner cell: only E, S, SE samples exist, all lower.
        let w = window(5, 5, |r, c| Some(100.0 - (r + c) as f32));
        let s = dominance_confidence(&w, 0, 0, 2, 1).unwrap();
        assert_eq!(s.radial, 1.0);
        assert_eq!(s.neighborhood, 1.0);
        assert_relative_eq!(s.combined, 1.0);
    }

    #[test]
    fn equal_neighbours_do_not_count_as_lower() {
        let w = window(5, 5, |_, _| Some(7.0));
        let s = dominance_confidence(&w, 2, 2, 1, 2).unwrap();
        assert_eq!(s.radial, 0.0);
        assert_eq!(s.neighborhood, 0.0);
    }

    #[test]
    fn ridge_scores_below_pyramid() {
        // N–S ridge: the N and S samples sit at the same height, the other six fall away.
        let ridge = window(21, 21, |_, c| Some(300.0 - 4.0 * (c as i32 - 10).abs() as f32));
        let s = dominance_confidence(&ridge, 10, 10, 3, 5).unwrap();
        assert_eq!(s.radial, 0.75);
        // 10 of the 120 neighbours share the ridge line.
        assert_relative_eq!(s.neighborhood, 110.0 / 120.0);

        let pyramid = window(21, 21, |r, c| {
            let d = (r as i32 - 10).abs().max((c as i32 - 10).abs());
            Some(500.0 - 5.0 * d as f32)
        });
        let p = dominance_confidence(&pyramid, 10, 10, 3, 5).unwrap();
        assert_eq!(p.radial, 1.0);
        assert_eq!(p.neighborhood, 1.0);
        assert!(p.combined > s.combined);
    }

    #[test]
    fn combined_always_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let w = window(15, 15, |_, _| {
                if rng.gen_bool(0.2) { None } else { Some(rng.gen_range(0.0..100.0)) }
            });
            for r in 0..15 {
                for c in 0..15 {
                    if let Ok(s) = dominance_confidence(&w, r, c, 3, 4) {
                        assert!((0.0..=1.0).contains(&s.combined));
                    }
                }
            }
        }
    }
}
