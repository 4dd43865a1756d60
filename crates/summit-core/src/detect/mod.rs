//! Candidate detection: local maxima, top-N ranking, and grid-sampling fallback.
pub mod maxima;
pub mod sampling;
pub mod smoothing;

use serde::{Deserialize, Serialize};

use crate::window::ElevationWindow;

pub use maxima::{find_candidates, find_candidates_multiscale};
pub use sampling::{grid_sample, top_n_cells};

/// A detected cell of the request window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPeak {
    pub row: usize,
    pub col: usize,
    /// Raw (unsmoothed) elevation, metres.
    pub elevation: f32,
}

/// Which generator produced a candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Strict local maxima over one or more neighbourhood sizes.
    LocalMaxima,
    /// Highest cells by raw elevation.
    TopN,
    /// Regular grid sampling, used when no maximum lies inside the radius.
    GridSample,
}

/// Configured primary detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DetectionStrategy {
    LocalMaxima {
        /// Odd neighbourhood edges in cells; results are unioned.
        neighborhood_sizes: Vec<usize>,
        /// Gaussian sigma in cells; 0 disables smoothing.
        #[serde(default)]
        smoothing_sigma: f64,
    },
    TopN {
        /// Number of cells to keep; every valid cell when absent.
        #[serde(default)]
        n: Option<usize>,
    },
}

impl Default for DetectionStrategy {
    fn default() -> Self {
        DetectionStrategy::LocalMaxima { neighborhood_sizes: vec![3, 5, 9], smoothing_sigma: 0.0 }
    }
}

impl DetectionStrategy {
    pub fn mode(&self) -> DetectionMode {
        match self {
            DetectionStrategy::LocalMaxima { .. } => DetectionMode::LocalMaxima,
            DetectionStrategy::TopN { .. } => DetectionMode::TopN,
        }
    }

    /// Run the primary detector over the whole window.
    pub fn detect(&self, window: &ElevationWindow) -> Vec<GridPeak> {
        match self {
            DetectionStrategy::LocalMaxima { neighborhood_sizes, smoothing_sigma } => {
                find_candidates_multiscale(window, neighborhood_sizes, *smoothing_sigma)
            }
            DetectionStrategy::TopN { n } => top_n_cells(window, *n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_from_tagged_json() {
        let s: DetectionStrategy =
            serde_json::from_str(r#"{"mode": "local_maxima", "neighborhood_sizes": [3, 7]}"#).unwrap();
        assert_eq!(s, DetectionStrategy::LocalMaxima { neighborhood_sizes: vec![3, 7], smoothing_sigma: 0.0 });
        let s: DetectionStrategy = serde_json::from_str(r#"{"mode": "top_n", "n": 25}"#).unwrap();
        assert_eq!(s.mode(), DetectionMode::TopN);
    }
}
