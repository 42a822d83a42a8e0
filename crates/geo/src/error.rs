use thiserror::Error;

/// Geometry and boundary-dataset errors.
///
/// These surface at index build/reload time. `locate` itself never fails.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("invalid coordinate (lat {lat}, lng {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },

    #[error("degenerate ring: {0}")]
    DegenerateRing(String),

    #[error("region '{0}' has no polygon parts")]
    EmptyRegion(String),

    #[error("duplicate region key '{0}'")]
    DuplicateRegion(String),

    #[error("invalid boundary dataset: {0}")]
    Dataset(String),

    #[error("boundary dataset is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
