//! Error taxonomy shared by the inference pipeline, evaluation and dataset code

use std::path::PathBuf;

/// Errors produced by churnscope.
///
/// Input errors (`InvalidCategory`, `InvalidRange`, `InvalidInput`) reject a
/// single request. Artifact errors (`ArtifactNotFound`, `ArtifactCorrupt`,
/// `DimensionMismatch`, `ShapeMismatch`, `FeatureOrderMismatch`) mean the
/// loaded parameters cannot serve any request until they are replaced.
#[derive(thiserror::Error, Debug)]
pub enum ChurnError {
    /// A categorical field holds a value outside its enumerated set.
    #[error("invalid value {value:?} for categorical field `{field}`")]
    InvalidCategory { field: &'static str, value: String },

    /// A numeric field is outside its declared bounds.
    #[error("value {value} for field `{field}` is outside [{min}, {max}]")]
    InvalidRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Malformed caller input that cannot be mapped onto a record at all.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("artifact not found: {}", path.display())]
    ArtifactNotFound { path: PathBuf },

    #[error("artifact {} is corrupt: {reason}", path.display())]
    ArtifactCorrupt { path: PathBuf, reason: String },

    /// A weight tensor or input width disagrees with the declared network dims.
    #[error("dimension mismatch in {layer}: expected shape {expected:?}, found {actual:?}")]
    DimensionMismatch {
        layer: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The feature vector length differs from the number of fitted scaler parameters.
    #[error("feature vector has {actual} values but the scaler was fitted on {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("scaler was fitted on features {found:?}, encoder produces {expected:?}")]
    FeatureOrderMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("render error: {0}")]
    Render(String),
}

impl From<polars::error::PolarsError> for ChurnError {
    fn from(err: polars::error::PolarsError) -> Self {
        ChurnError::Dataset(err.to_string())
    }
}

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, ChurnError>;
