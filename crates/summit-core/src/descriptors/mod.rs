//! Per-candidate terrain measurements: the classifier descriptor vector and
//! the training-free dominance score.
pub mod dominance;
pub mod vector;

pub use dominance::{dominance_confidence, DominanceScore};
pub use vector::{extract_descriptors, TerrainDescriptorVector, FEATURE_COUNT, FEATURE_NAMES};

/// Compass steps as `(d_row, d_col)` in N, S, E, W, NE, SE, SW, NW order;
/// row 0 is north. The order matches the `gradient_*` descriptor layout.
pub const DIRECTIONS: [(isize, isize); 8] = [(-1, 0), (1, 0), (0, 1), (0, -1), (-1, 1), (1, 1), (1, -1), (-1, -1)];
