//! Error types for summit detection.

use serde::Serialize;
use thiserror::Error;

/// Failure of a single detection request, a single candidate, or a whole run.
///
/// Per-candidate variants (`CenterMasked`, `WindowTooSmall`) are dropped by the
/// engine and only surface from the descriptor functions themselves.
#[derive(Error, Debug)]
pub enum SummitError {
    #[error("elevation source has no coordinate reference system")]
    MissingCoordinateReferenceSystem,

    #[error("projected source (EPSG:{epsg}) has no reprojection available")]
    MissingTransform { epsg: u32 },

    #[error("no valid elevation data in window")]
    NoData,

    #[error("window too small: {width}x{height} cells (minimum 3x3)")]
    WindowTooSmall { width: usize, height: usize },

    #[error("centre cell ({row}, {col}) is masked")]
    CenterMasked { row: usize, col: usize },

    #[error("no summit candidates found within {radius_m} m")]
    NoCandidates { radius_m: f64 },

    #[error("classifier model could not be loaded: {0}")]
    ModelLoadFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stable machine-readable code written to batch error records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MissingCoordinateReferenceSystem,
    MissingTransform,
    NoData,
    WindowTooSmall,
    CenterMasked,
    NoCandidates,
    ModelLoadFailed,
    InvalidInput,
    Io,
    /// A record's processing panicked; the batch continued.
    Internal,
}

impl SummitError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SummitError::MissingCoordinateReferenceSystem => ErrorCode::MissingCoordinateReferenceSystem,
            SummitError::MissingTransform { .. } => ErrorCode::MissingTransform,
            SummitError::NoData => ErrorCode::NoData,
            SummitError::WindowTooSmall { .. } => ErrorCode::WindowTooSmall,
            SummitError::CenterMasked { .. } => ErrorCode::CenterMasked,
            SummitError::NoCandidates { .. } => ErrorCode::NoCandidates,
            SummitError::ModelLoadFailed(_) => ErrorCode::ModelLoadFailed,
            SummitError::InvalidInput(_) | SummitError::Json(_) => ErrorCode::InvalidInput,
            SummitError::Io(_) => ErrorCode::Io,
        }
    }

    /// True for failures that invalidate every later request of a run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SummitError::ModelLoadFailed(_))
    }
}

/// Result alias for summit detection.
pub type Result<T> = std::result::Result<T, SummitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_snake_case() {
        let json = serde_json::to_string(&SummitError::NoCandidates { radius_m: 100.0 }.code()).unwrap();
        assert_eq!(json, "\"no_candidates\"");
        let json = serde_json::to_string(&ErrorCode::MissingCoordinateReferenceSystem).unwrap();
        assert_eq!(json, "\"missing_coordinate_reference_system\"");
    }

    #[test]
    fn only_model_load_is_fatal() {
        assert!(SummitError::ModelLoadFailed("bad".into()).is_fatal());
        assert!(!SummitError::NoData.is_fatal());
        assert!(!SummitError::CenterMasked { row: 0, col: 0 }.is_fatal());
    }
}
