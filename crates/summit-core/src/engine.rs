//! The per-request snapping pipeline.
//!
//! read window → detect → (fallback) → dominance / descriptors / classifier →
//! rank → separate. One window read per request; every candidate is scored
//! from that in-memory window.
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{score, SummitClassifier};
use crate::coords::LatLon;
use crate::descriptors::{dominance_confidence, extract_descriptors, DominanceScore, TerrainDescriptorVector};
use crate::detect::{grid_sample, DetectionMode, DetectionStrategy, GridPeak};
use crate::error::{Result, SummitError};
use crate::raster::WindowProvider;
use crate::reconcile::CoordinateReconciler;
use crate::select::{highest_candidate, select, Candidate, SortMode};
use crate::window::ElevationWindow;

/// Run configuration. Request fields left unset fall back to these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapParams {
    /// Candidate search radius, metres.
    pub radius_m: f64,
    pub top_k: usize,
    /// Minimum great-circle distance between selected candidates, metres.
    pub min_separation_m: f64,
    /// Half-size of the descriptor window, metres.
    pub feature_radius_m: f64,
    pub detection: DetectionStrategy,
    /// Spacing of the fallback sampling grid, metres.
    pub grid_step_m: f64,
    /// Radial sample offset for dominance, cells.
    pub dominance_offset_cells: usize,
    /// Neighbourhood radius for dominance, cells.
    pub dominance_neighborhood_cells: usize,
    /// Compute the training-free dominance confidence.
    pub use_confidence: bool,
    /// Among equally confident candidates, prefer the one nearest the seed.
    pub prefer_nearest: bool,
}

impl Default for SnapParams {
    fn default() -> Self {
        Self {
            radius_m: 250.0,
            top_k: 1,
            min_separation_m: 30.0,
            feature_radius_m: 50.0,
            detection: DetectionStrategy::default(),
            grid_step_m: 10.0,
            dominance_offset_cells: 3,
            dominance_neighborhood_cells: 10,
            use_confidence: true,
            prefer_nearest: false,
        }
    }
}

impl SnapParams {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// One snapping request.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapRequest {
    /// Centre of the candidate search.
    pub center: LatLon,
    /// Reference point for distances; the centre when absent.
    pub seed: Option<LatLon>,
    pub radius_m: f64,
    pub top_k: usize,
    pub min_separation_m: f64,
}

impl SnapRequest {
    /// Request at `center` using the configured defaults.
    pub fn new(center: LatLon, params: &SnapParams) -> Self {
        Self {
            center,
            seed: None,
            radius_m: params.radius_m,
            top_k: params.top_k,
            min_separation_m: params.min_separation_m,
        }
    }

    pub fn seed(&self) -> LatLon {
        self.seed.unwrap_or(self.center)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.center.is_valid() {
            return Err(SummitError::InvalidInput(format!(
                "coordinates out of range: ({}, {})",
                self.center.lat, self.center.lon
            )));
        }
        if let Some(seed) = self.seed {
            if !seed.is_valid() {
                return Err(SummitError::InvalidInput(format!("seed out of range: ({}, {})", seed.lat, seed.lon)));
            }
        }
        if !(self.radius_m.is_finite() && self.radius_m > 0.0) {
            return Err(SummitError::InvalidInput(format!("radius_m must be positive, got {}", self.radius_m)));
        }
        if !(self.min_separation_m.is_finite() && self.min_separation_m >= 0.0) {
            return Err(SummitError::InvalidInput(format!(
                "min_separation_m must be non-negative, got {}",
                self.min_separation_m
            )));
        }
        if self.top_k == 0 {
            return Err(SummitError::InvalidInput("top_k must be at least 1".into()));
        }
        Ok(())
    }
}

/// Successful result of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapReport {
    pub detection_mode: DetectionMode,
    pub sort_mode: SortMode,
    /// Candidates inside the search radius before scoring.
    pub candidates_found: usize,
    /// Candidates that survived scoring.
    pub candidates_scored: usize,
    pub candidates: Vec<Candidate>,
    /// Highest of all found candidates, regardless of selection.
    pub highest: Option<Candidate>,
}

pub struct SummitDetector<P> {
    provider: P,
    classifier: Option<Box<dyn SummitClassifier>>,
    params: SnapParams,
}

impl<P: WindowProvider> SummitDetector<P> {
    pub fn new(provider: P, params: SnapParams) -> Self {
        Self { provider, classifier: None, params }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn SummitClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn params(&self) -> &SnapParams {
        &self.params
    }

    /// Run the full pipeline for one request.
    pub fn snap(&self, request: &SnapRequest) -> Result<SnapReport> {
        request.validate()?;
        let params = &self.params;
        let reconciler = self.provider.reconciler();

        let window = self.provider.read_window(request.center, request.radius_m + params.feature_radius_m)?;

        let (found, detection_mode) = self.detect(&window, reconciler, request)?;
        let candidates_found = found.len();
        let highest = highest_candidate(&found).cloned();

        let scored: Vec<Candidate> = found.into_iter().filter_map(|c| self.score_candidate(&window, c, request)).collect();
        if scored.is_empty() {
            debug!(candidates_found, "every candidate was dropped during scoring");
            return Err(SummitError::NoCandidates { radius_m: request.radius_m });
        }
        let candidates_scored = scored.len();

        let mode = SortMode::for_candidates(&scored, params.prefer_nearest);
        let selection = select(scored, request.top_k, request.min_separation_m, mode);
        let sort_mode = selection.sort_mode();
        debug!(?detection_mode, ?sort_mode, candidates_found, candidates_scored, selected = selection.len(), "request done");

        Ok(SnapReport {
            detection_mode,
            sort_mode,
            candidates_found,
            candidates_scored,
            candidates: selection.into_candidates(),
            highest,
        })
    }

    /// Primary detection restricted to the search radius, then the grid
    /// fallback when nothing is left.
    fn detect(
        &self,
        window: &ElevationWindow,
        reconciler: &CoordinateReconciler,
        request: &SnapRequest,
    ) -> Result<(Vec<Candidate>, DetectionMode)> {
        let seed = request.seed();
        let to_candidates = |peaks: Vec<GridPeak>| -> Vec<Candidate> {
            peaks
                .into_iter()
                .filter_map(|p| {
                    let position = reconciler.cell_to_latlon(window, p.row, p.col);
                    (request.center.distance_m(position) <= request.radius_m)
                        .then(|| Candidate::new(p.row, p.col, position, p.elevation as f64, seed))
                })
                .collect()
        };

        let primary = to_candidates(self.params.detection.detect(window));
        if !primary.is_empty() {
            return Ok((primary, self.params.detection.mode()));
        }

        debug!(radius_m = request.radius_m, "no maxima inside radius; falling back to grid sampling");
        let sampled = grid_sample(window, reconciler, request.center, request.radius_m, self.params.grid_step_m);
        let fallback = to_candidates(sampled);
        if fallback.is_empty() {
            return Err(SummitError::NoCandidates { radius_m: request.radius_m });
        }
        Ok((fallback, DetectionMode::GridSample))
    }

    /// Attach dominance and classifier scores; `None` drops the candidate.
    fn score_candidate(&self, window: &ElevationWindow, mut cand: Candidate, request: &SnapRequest) -> Option<Candidate> {
        let params = &self.params;
        if params.use_confidence {
            match dominance_confidence(
                window,
                cand.row,
                cand.col,
                params.dominance_offset_cells,
                params.dominance_neighborhood_cells,
            ) {
                Ok(d) => cand.confidence = Some(d.combined),
                Err(e) => {
                    debug!(row = cand.row, col = cand.col, error = %e, "candidate dropped");
                    return None;
                }
            }
        }

        if let Some(classifier) = &self.classifier {
            match extract_descriptors(
                window,
                cand.row,
                cand.col,
                params.feature_radius_m,
                cand.position(),
                Some(request.seed()),
            ) {
                Ok(v) => {
                    cand.probability = Some(score(classifier.as_ref(), &v.to_array()));
                    cand.descriptors = Some(v);
                }
                Err(e) => {
                    debug!(row = cand.row, col = cand.col, error = %e, "candidate dropped");
                    return None;
                }
            }
        }
        Some(cand)
    }
}

/// Descriptors of the single cell containing a point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointDescription {
    /// Centre of the containing cell.
    pub lat: f64,
    pub lon: f64,
    pub elevation_m: f64,
    pub features: TerrainDescriptorVector,
    pub dominance: DominanceScore,
}

/// Read a window of `feature_radius_m` around `point` and describe the cell
/// that contains it.
pub fn describe_point<P: WindowProvider>(
    provider: &P,
    point: LatLon,
    feature_radius_m: f64,
    seed: Option<LatLon>,
    params: &SnapParams,
) -> Result<PointDescription> {
    if !point.is_valid() {
        return Err(SummitError::InvalidInput(format!("coordinates out of range: ({}, {})", point.lat, point.lon)));
    }
    if !(feature_radius_m.is_finite() && feature_radius_m > 0.0) {
        return Err(SummitError::InvalidInput(format!("feature radius must be positive, got {feature_radius_m}")));
    }
    let window = provider.read_window(point, feature_radius_m)?;
    let reconciler = provider.reconciler();
    let (row, col) = reconciler.latlon_to_cell(&window, point).ok_or(SummitError::NoData)?;
    let position = reconciler.cell_to_latlon(&window, row, col);
    let features = extract_descriptors(&window, row, col, feature_radius_m, position, seed)?;
    let dominance =
        dominance_confidence(&window, row, col, params.dominance_offset_cells, params.dominance_neighborhood_cells)?;
    let elevation_m = window.value(row, col).ok_or(SummitError::CenterMasked { row, col })? as f64;
    Ok(PointDescription { lat: position.lat, lon: position.lon, elevation_m, features, dominance })
}
