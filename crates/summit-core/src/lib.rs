//! Summit detection on digital elevation models.
//!
//! Given a seed coordinate and a search radius, find candidate summit cells
//! in the surrounding elevation window, score them (dominance confidence,
//! optional learned classifier), and select a ranked, spatially separated
//! set of summits.
pub mod batch;
pub mod classifier;
pub mod coords;
pub mod descriptors;
pub mod detect;
pub mod engine;
pub mod error;
pub mod geotransform;
pub mod raster;
pub mod reconcile;
pub mod select;
pub mod window;

pub use classifier::{load_model, ClassifierError, SummitClassifier};
pub use coords::LatLon;
pub use descriptors::{TerrainDescriptorVector, FEATURE_NAMES};
pub use detect::{DetectionMode, DetectionStrategy};
pub use engine::{describe_point, PointDescription, SnapParams, SnapReport, SnapRequest, SummitDetector};
pub use error::{ErrorCode, Result, SummitError};
pub use raster::{DemRaster, DemSource, WindowProvider};
pub use reconcile::{CoordinateReconciler, Crs};
pub use select::{Candidate, RankedSelection, SortMode};
pub use window::ElevationWindow;
