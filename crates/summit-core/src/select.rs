//! Candidate ranking and greedy minimum-separation selection.
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::coords::{haversine_m, LatLon};
use crate::descriptors::TerrainDescriptorVector;

/// A summit candidate, enriched as it moves through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    #[serde(skip)]
    pub row: usize,
    #[serde(skip)]
    pub col: usize,
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "elevation_m")]
    pub elevation: f64,
    /// Combined dominance score in [0, 1].
    pub confidence: Option<f64>,
    /// Classifier positive-class probability in [0, 1].
    pub probability: Option<f64>,
    pub distance_from_seed_m: f64,
    #[serde(skip)]
    pub descriptors: Option<TerrainDescriptorVector>,
}

impl Candidate {
    pub fn new(row: usize, col: usize, position: LatLon, elevation: f64, seed: LatLon) -> Self {
        Candidate {
            row,
            col,
            lat: position.lat,
            lon: position.lon,
            elevation,
            confidence: None,
            probability: None,
            distance_from_seed_m: haversine_m(position, seed),
            descriptors: None,
        }
    }

    pub fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

/// Primary ordering applied before separation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum SortMode {
    /// Probability desc, then elevation desc.
    Probability,
    /// Confidence decile desc, elevation in 2 m bands desc, then optionally
    /// nearest to the seed first.
    Confidence { prefer_nearest: bool },
    /// Elevation desc.
    Elevation,
}

impl SortMode {
    /// Probability if any candidate was classified, confidence if any was
    /// scored, elevation otherwise.
    pub fn for_candidates(candidates: &[Candidate], prefer_nearest: bool) -> Self {
        if candidates.iter().any(|c| c.probability.is_some()) {
            SortMode::Probability
        } else if candidates.iter().any(|c| c.confidence.is_some()) {
            SortMode::Confidence { prefer_nearest }
        } else {
            SortMode::Elevation
        }
    }

    fn compare(self, a: &Candidate, b: &Candidate) -> Ordering {
        let primary = match self {
            SortMode::Probability => {
                let pa = a.probability.unwrap_or(0.0);
                let pb = b.probability.unwrap_or(0.0);
                pb.total_cmp(&pa)
            }
            SortMode::Confidence { prefer_nearest } => {
                let by_bucket = confidence_bucket(b).cmp(&confidence_bucket(a));
                let by_band = elevation_band(b).cmp(&elevation_band(a));
                let by_distance = if prefer_nearest {
                    a.distance_from_seed_m.total_cmp(&b.distance_from_seed_m)
                } else {
                    Ordering::Equal
                };
                by_bucket.then(by_band).then(by_distance)
            }
            SortMode::Elevation => Ordering::Equal,
        };
        primary
            .then_with(|| b.elevation.total_cmp(&a.elevation))
            .then_with(|| a.row.cmp(&b.row))
            .then_with(|| a.col.cmp(&b.col))
    }
}

fn confidence_bucket(c: &Candidate) -> i64 {
    (c.confidence.unwrap_or(0.0) * 10.0).floor() as i64
}

fn elevation_band(c: &Candidate) -> i64 {
    (c.elevation / 2.0).floor() as i64
}

/// Selected candidates, pairwise at least the requested separation apart.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedSelection {
    candidates: Vec<Candidate>,
    sort_mode: SortMode,
}

impl RankedSelection {
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn into_candidates(self) -> Vec<Candidate> {
        self.candidates
    }

    pub fn sort_mode(&self) -> SortMode {
        self.sort_mode
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Sort by `sort_mode`, then greedily accept candidates at least
/// `min_separation_m` (great-circle) from every accepted one, up to `top_k`.
///
/// Greedy acceptance is order-dependent: a high-ranked candidate can shadow a
/// pair of lower ones that would together have been a better answer.
pub fn select(mut candidates: Vec<Candidate>, top_k: usize, min_separation_m: f64, sort_mode: SortMode) -> RankedSelection {
    candidates.sort_by(|a, b| sort_mode.compare(a, b));

    let mut kept: Vec<Candidate> = Vec::with_capacity(top_k.min(candidates.len()));
    'outer: for cand in candidates {
        if kept.len() >= top_k {
            break;
        }
        if min_separation_m > 0.0 {
            for other in &kept {
                if haversine_m(cand.position(), other.position()) < min_separation_m {
                    continue 'outer;
                }
            }
        }
        kept.push(cand);
    }

    RankedSelection { candidates: kept, sort_mode }
}

/// The highest candidate of the whole set, before any filtering.
pub fn highest_candidate(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().min_by(|a, b| SortMode::Elevation.compare(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const SEED: LatLon = LatLon { lat: 46.0, lon: 7.0 };

    fn cand(row: usize, col: usize, north_m: f64, east_m: f64, elevation: f64) -> Candidate {
        Candidate::new(row, col, SEED.offset_m(north_m, east_m), elevation, SEED)
    }

    #[test]
    fn twin_summits_keep_only_the_higher() {
        let a = cand(0, 0, 0.0, 0.0, 1500.0);
        let b = cand(0, 1, 0.0, 10.0, 1501.0);
        let sel = select(vec![a, b], 2, 30.0, SortMode::Elevation);
        assert_eq!(sel.len(), 1);
        assert_eq!(sel.candidates()[0].elevation, 1501.0);
    }

    #[test]
    fn zero_separation_keeps_everything_up_to_k() {
        let cands: Vec<_> = (0..5).map(|i| cand(0, i, 0.0, i as f64, 100.0 + i as f64)).collect();
        let sel = select(cands, 3, 0.0, SortMode::Elevation);
        let elev: Vec<_> = sel.candidates().iter().map(|c| c.elevation).collect();
        assert_eq!(elev, vec![104.0, 103.0, 102.0]);
    }

    #[test]
    fn probability_mode_ranks_before_elevation() {
        let mut low = cand(0, 0, 0.0, 0.0, 100.0);
        low.probability = Some(0.9);
        let mut high = cand(5, 5, 500.0, 0.0, 900.0);
        high.probability = Some(0.2);
        let mode = SortMode::for_candidates(&[low.clone(), high.clone()], false);
        assert_eq!(mode, SortMode::Probability);
        let sel = select(vec![high, low], 2, 30.0, mode);
        assert_eq!(sel.candidates()[0].elevation, 100.0);
    }

    #[test]
    fn confidence_mode_buckets_and_prefers_nearest() {
        // Same decile and same 2 m band; nearest wins only with prefer_nearest.
        let mut far = cand(0, 0, 200.0, 0.0, 1001.0);
        far.confidence = Some(0.83);
        let mut near = cand(1, 1, 50.0, 0.0, 1000.5);
        near.confidence = Some(0.87);
        let cands = vec![far.clone(), near.clone()];

        let sel = select(cands.clone(), 1, 0.0, SortMode::Confidence { prefer_nearest: true });
        assert_eq!(sel.candidates()[0].row, 1);
        let sel = select(cands, 1, 0.0, SortMode::Confidence { prefer_nearest: false });
        assert_eq!(sel.candidates()[0].row, 0);

        // A higher decile beats any elevation.
        let mut sharp = cand(2, 2, 100.0, 0.0, 10.0);
        sharp.confidence = Some(0.95);
        let sel = select(vec![far, near, sharp], 1, 0.0, SortMode::Confidence { prefer_nearest: true });
        assert_eq!(sel.candidates()[0].row, 2);
    }

    #[test]
    fn sort_mode_falls_back_to_elevation() {
        let c = cand(0, 0, 0.0, 0.0, 1.0);
        assert_eq!(SortMode::for_candidates(&[c.clone()], true), SortMode::Elevation);
        let mut s = c;
        s.confidence = Some(0.5);
        assert_eq!(SortMode::for_candidates(&[s], true), SortMode::Confidence { prefer_nearest: true });
    }

    #[test]
    fn ties_break_by_grid_position() {
        let a = cand(3, 1, 100.0, 0.0, 50.0);
        let b = cand(1, 4, 0.0, 100.0, 50.0);
        let c = cand(1, 2, 200.0, 200.0, 50.0);
        let sel = select(vec![a, b, c], 3, 0.0, SortMode::Elevation);
        let cells: Vec<_> = sel.candidates().iter().map(|c| (c.row, c.col)).collect();
        assert_eq!(cells, vec![(1, 2), (1, 4), (3, 1)]);
    }

    #[test]
    fn highest_ignores_selection() {
        let mut a = cand(0, 0, 0.0, 0.0, 300.0);
        a.probability = Some(0.9);
        let mut b = cand(1, 1, 100.0, 0.0, 800.0);
        b.probability = Some(0.1);
        let all = vec![a, b];
        let sel = select(all.clone(), 1, 30.0, SortMode::Probability);
        assert_eq!(sel.candidates()[0].elevation, 300.0);
        assert_eq!(highest_candidate(&all).map(|c| c.elevation), Some(800.0));
        assert!(highest_candidate(&[]).is_none());
    }

    #[test]
    fn random_selections_respect_separation_and_are_idempotent() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..30 {
            let n = rng.gen_range(1..60);
            let cands: Vec<_> = (0..n)
                .map(|i| {
                    let mut c = cand(
                        i / 8,
                        i % 8,
                        rng.gen_range(-300.0..300.0),
                        rng.gen_range(-300.0..300.0),
                        rng.gen_range(0.0..50.0f64).round(),
                    );
                    c.confidence = Some(rng.gen_range(0.0..1.0));
                    c
                })
                .collect();
            let sep = rng.gen_range(0.0..120.0);
            let k = rng.gen_range(1..10);
            let mode = SortMode::Confidence { prefer_nearest: rng.gen_bool(0.5) };

            let sel = select(cands.clone(), k, sep, mode);
            assert!(sel.len() <= k);
            for (i, a) in sel.candidates().iter().enumerate() {
                for b in &sel.candidates()[i + 1..] {
                    assert!(haversine_m(a.position(), b.position()) >= sep);
                }
            }
            assert_eq!(select(cands, k, sep, mode), sel);
        }
    }
}
