//! Fitted input scaling loaded from a persisted artifact

use std::fs;
use std::path::Path;

use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};

use crate::encoder::{FeatureVector, FEATURE_NAMES};
use crate::error::{ChurnError, Result};

/// On-disk form of the scaler.
///
/// ```json
/// {"kind": "standard", "mean": [..], "scale": [..], "feature_names": [..]}
/// {"kind": "min_max", "min": [..], "scale": [..]}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerArtifact {
    #[serde(flatten)]
    transform: AffineTransform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    feature_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum AffineTransform {
    /// `(x - mean) / scale`
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    /// `x * scale + min`
    MinMax { min: Vec<f64>, scale: Vec<f64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalerKind {
    Standard,
    MinMax,
}

/// Immutable per-feature affine parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalerParameters {
    kind: ScalerKind,
    offset: Array1<f64>,
    scale: Array1<f64>,
}

impl ScalerParameters {
    /// Standardisation: `(x - mean) / scale`.
    pub fn standard(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        Self::validate(
            AffineTransform::Standard { mean, scale },
            Path::new("<memory>"),
        )
    }

    /// Min-max scaling: `x * scale + min`.
    pub fn min_max(min: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        Self::validate(AffineTransform::MinMax { min, scale }, Path::new("<memory>"))
    }

    /// Load scaler parameters from a JSON artifact.
    ///
    /// When the artifact records the feature names it was fitted on, they must
    /// match [`FEATURE_NAMES`] exactly, in order.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ChurnError::ArtifactNotFound {
                path: path.to_path_buf(),
            });
        }

        let corrupt = |reason: String| ChurnError::ArtifactCorrupt {
            path: path.to_path_buf(),
            reason,
        };

        let raw = fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
        let artifact: ScalerArtifact =
            serde_json::from_str(&raw).map_err(|e| corrupt(e.to_string()))?;

        if let Some(names) = &artifact.feature_names {
            if names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
                return Err(ChurnError::FeatureOrderMismatch {
                    expected: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
                    found: names.clone(),
                });
            }
        }

        let params = Self::validate(artifact.transform, path)?;
        tracing::debug!(
            path = %path.display(),
            kind = ?params.kind,
            n_features = params.n_features(),
            "loaded scaler parameters"
        );
        Ok(params)
    }

    /// Write the parameters as a JSON artifact, recording [`FEATURE_NAMES`]
    /// when the width matches the encoder.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let offset = self.offset.to_vec();
        let scale = self.scale.to_vec();
        let transform = match self.kind {
            ScalerKind::Standard => AffineTransform::Standard {
                mean: offset,
                scale,
            },
            ScalerKind::MinMax => AffineTransform::MinMax { min: offset, scale },
        };
        let feature_names = (self.n_features() == FEATURE_NAMES.len())
            .then(|| FEATURE_NAMES.iter().map(|s| s.to_string()).collect());
        let artifact = ScalerArtifact {
            transform,
            feature_names,
        };

        let json = serde_json::to_string_pretty(&artifact).map_err(|e| {
            ChurnError::ArtifactCorrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        fs::write(path, json).map_err(|e| ChurnError::ArtifactCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn validate(transform: AffineTransform, path: &Path) -> Result<Self> {
        let corrupt = |reason: String| ChurnError::ArtifactCorrupt {
            path: path.to_path_buf(),
            reason,
        };

        let (kind, offset, scale) = match transform {
            AffineTransform::Standard { mean, scale } => (ScalerKind::Standard, mean, scale),
            AffineTransform::MinMax { min, scale } => (ScalerKind::MinMax, min, scale),
        };

        if offset.is_empty() || offset.len() != scale.len() {
            return Err(corrupt(format!(
                "parameter vectors have lengths {} and {}",
                offset.len(),
                scale.len()
            )));
        }
        if offset.iter().chain(scale.iter()).any(|v| !v.is_finite()) {
            return Err(corrupt("non-finite scaler parameter".to_string()));
        }
        if kind == ScalerKind::Standard && scale.iter().any(|&s| s == 0.0) {
            return Err(corrupt("zero scale in standard scaler".to_string()));
        }

        Ok(ScalerParameters {
            kind,
            offset: Array1::from(offset),
            scale: Array1::from(scale),
        })
    }

    pub fn kind(&self) -> ScalerKind {
        self.kind
    }

    /// Number of features the parameters were fitted on.
    pub fn n_features(&self) -> usize {
        self.offset.len()
    }

    /// Apply the fitted transform feature-wise.
    pub fn transform(&self, features: &FeatureVector) -> Result<FeatureVector> {
        if features.len() != self.n_features() {
            return Err(ChurnError::ShapeMismatch {
                expected: self.n_features(),
                actual: features.len(),
            });
        }
        if let Some(idx) = features.values().iter().position(|x| !x.is_finite()) {
            return Err(ChurnError::InvalidInput(format!(
                "feature {idx} is not finite"
            )));
        }

        let scaled = match self.kind {
            ScalerKind::Standard => Zip::from(features.values())
                .and(&self.offset)
                .and(&self.scale)
                .map_collect(|&x, &mean, &scale| (x - mean) / scale),
            ScalerKind::MinMax => Zip::from(features.values())
                .and(&self.offset)
                .and(&self.scale)
                .map_collect(|&x, &min, &scale| x * scale + min),
        };

        Ok(FeatureVector::from(scaled))
    }
}
