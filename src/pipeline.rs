//! Churn inference: encode → scale → forward pass → threshold

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use crate::encoder::{encode, FeatureVector, RawRecord};
use crate::error::{ChurnError, Result};
use crate::model::{Mode, ModelParameters, NetworkDims};
use crate::scaler::ScalerParameters;

/// Probabilities strictly above this are labelled as churn.
pub const CHURN_THRESHOLD: f64 = 0.5;

/// Default scaler artifact location, relative to the working directory.
pub const DEFAULT_SCALER_PATH: &str = "Outputs/Models/scaler.json";

/// Default model artifact location, relative to the working directory.
pub const DEFAULT_MODEL_PATH: &str = "Outputs/Models/churn_model.json";

/// Where the fitted artifacts live and what shape the network is declared with.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub scaler: PathBuf,
    pub model: PathBuf,
    pub dims: NetworkDims,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            scaler: PathBuf::from(DEFAULT_SCALER_PATH),
            model: PathBuf::from(DEFAULT_MODEL_PATH),
            dims: NetworkDims::default(),
        }
    }
}

/// Outcome of a single prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Churn probability in (0, 1)
    pub probability: f64,
    /// `probability > CHURN_THRESHOLD`
    pub churn: bool,
}

impl Prediction {
    pub fn from_probability(probability: f64) -> Self {
        Self {
            probability,
            churn: probability > CHURN_THRESHOLD,
        }
    }
}

/// Loaded scaler and model, shared read-only between callers.
#[derive(Debug, Clone)]
pub struct ChurnPredictor {
    scaler: Arc<ScalerParameters>,
    model: Arc<ModelParameters>,
}

impl ChurnPredictor {
    pub fn new(scaler: ScalerParameters, model: ModelParameters) -> Self {
        Self {
            scaler: Arc::new(scaler),
            model: Arc::new(model),
        }
    }

    /// Load both artifacts from disk.
    pub fn load(paths: &ArtifactPaths) -> Result<Self> {
        let scaler = ScalerParameters::load(&paths.scaler)?;
        if scaler.n_features() != paths.dims.input {
            return Err(ChurnError::ShapeMismatch {
                expected: paths.dims.input,
                actual: scaler.n_features(),
            });
        }
        let model = ModelParameters::load(&paths.model, paths.dims)?;
        tracing::info!(
            scaler = %paths.scaler.display(),
            model = %paths.model.display(),
            "churn predictor ready"
        );
        Ok(Self::new(scaler, model))
    }

    pub fn scaler(&self) -> &ScalerParameters {
        &self.scaler
    }

    pub fn model(&self) -> &ModelParameters {
        &self.model
    }

    /// Predict churn for one raw record.
    pub fn predict(&self, record: &RawRecord) -> Result<Prediction> {
        let features = encode(record)?;
        self.predict_vector(&features)
    }

    /// Predict churn for an already encoded (unscaled) feature vector.
    ///
    /// The vector must lie in the encoder's output domain; anything
    /// [`encode`] could not have produced is rejected before scaling.
    pub fn predict_vector(&self, features: &FeatureVector) -> Result<Prediction> {
        features.check_domain()?;
        let scaled = self.scaler.transform(features)?;
        let probability = self.model.forward(&scaled, Mode::Inference)?;
        let prediction = Prediction::from_probability(probability);
        tracing::debug!(
            probability = prediction.probability,
            churn = prediction.churn,
            "churn prediction"
        );
        Ok(prediction)
    }
}

/// Lazily loaded predictor, initialised at most once.
///
/// The first successful [`SharedPredictor::get_or_load`] deserialises the
/// artifacts; concurrent first callers wait on the init lock and then see the
/// same instance. A failed load leaves the cell empty so the error reaches
/// every caller that tries.
///
/// The cell is bound to the paths it was loaded from. Asking for different
/// artifacts afterwards is an `InvalidInput` error; build a separate
/// [`ChurnPredictor`] for those.
#[derive(Debug, Default)]
pub struct SharedPredictor {
    cell: OnceLock<(ArtifactPaths, Arc<ChurnPredictor>)>,
    init: Mutex<()>,
}

impl SharedPredictor {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub fn get(&self) -> Option<Arc<ChurnPredictor>> {
        self.cell.get().map(|(_, predictor)| Arc::clone(predictor))
    }

    /// Paths the cached predictor was loaded from, if any.
    pub fn loaded_paths(&self) -> Option<&ArtifactPaths> {
        self.cell.get().map(|(paths, _)| paths)
    }

    pub fn get_or_load(&self, paths: &ArtifactPaths) -> Result<Arc<ChurnPredictor>> {
        if let Some(cached) = self.cell.get() {
            return Self::reuse(cached, paths);
        }

        // A poisoned lock only means another loader panicked; the cell is still consistent.
        let _guard = self.init.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(cached) = self.cell.get() {
            return Self::reuse(cached, paths);
        }

        let predictor = Arc::new(ChurnPredictor::load(paths)?);
        let _ = self.cell.set((paths.clone(), Arc::clone(&predictor)));
        Ok(predictor)
    }

    fn reuse(
        (loaded, predictor): &(ArtifactPaths, Arc<ChurnPredictor>),
        requested: &ArtifactPaths,
    ) -> Result<Arc<ChurnPredictor>> {
        if loaded != requested {
            return Err(ChurnError::InvalidInput(format!(
                "predictor already loaded from scaler={} model={} ({:?}); refusing scaler={} model={} ({:?})",
                loaded.scaler.display(),
                loaded.model.display(),
                loaded.dims,
                requested.scaler.display(),
                requested.model.display(),
                requested.dims,
            )));
        }
        Ok(Arc::clone(predictor))
    }
}

/// Process-wide predictor used by the CLI.
pub static GLOBAL_PREDICTOR: SharedPredictor = SharedPredictor::new();

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::FEATURE_DIM;
    use crate::scaler::ScalerKind;

    fn sample_record() -> RawRecord {
        RawRecord {
            failed_call_count: 0.0,
            submitted_complaint: "No".to_string(),
            months_as_customer: 24.0,
            billing_level: "Medium".to_string(),
            call_count: 10.0,
            sms_count: 20.0,
            plan_type: "Contractual".to_string(),
            account_status: "Active".to_string(),
            age: 35.0,
            customer_value: 500.0,
        }
    }

    fn random_predictor(seed: u64) -> ChurnPredictor {
        let scaler = ScalerParameters::standard(
            vec![2.0, 0.2, 30.0, 4.0, 30.0, 70.0, 0.8, 0.25, 31.0, 470.0],
            vec![3.0, 0.4, 8.0, 2.5, 25.0, 80.0, 0.4, 0.43, 8.5, 520.0],
        )
        .unwrap();
        let model = ModelParameters::kaiming_uniform(NetworkDims::default(), seed);
        ChurnPredictor::new(scaler, model)
    }

    #[test]
    fn test_threshold_law() {
        assert!(!Prediction::from_probability(0.5).churn);
        assert!(Prediction::from_probability(0.5 + f64::EPSILON).churn);
        assert!(!Prediction::from_probability(0.1).churn);
        assert!(Prediction::from_probability(0.9).churn);
    }

    #[test]
    fn test_predict_is_deterministic() {
        let predictor = random_predictor(17);
        let a = predictor.predict(&sample_record()).unwrap();
        let b = predictor.predict(&sample_record()).unwrap();
        assert_eq!(a.probability.to_bits(), b.probability.to_bits());
        assert_eq!(a.churn, b.churn);
        assert!(a.probability > 0.0 && a.probability < 1.0);
        assert_eq!(a.churn, a.probability > CHURN_THRESHOLD);
    }

    #[test]
    fn test_predict_vector_matches_predict() {
        let predictor = random_predictor(23);
        let features = encode(&sample_record()).unwrap();
        assert_eq!(
            predictor.predict_vector(&features).unwrap(),
            predictor.predict(&sample_record()).unwrap()
        );
    }

    #[test]
    fn test_predict_vector_rejects_values_outside_encoder_domain() {
        let predictor = random_predictor(23);
        let valid = encode(&sample_record()).unwrap();

        let mut values = valid.as_slice().to_vec();
        values[9] = f64::NAN;
        assert!(matches!(
            predictor.predict_vector(&FeatureVector::from(values.clone())),
            Err(ChurnError::InvalidRange {
                field: "customer_value",
                ..
            })
        ));

        values[9] = -5000.0;
        assert!(matches!(
            predictor.predict_vector(&FeatureVector::from(values.clone())),
            Err(ChurnError::InvalidRange {
                field: "customer_value",
                ..
            })
        ));

        values[9] = 500.0;
        values[6] = 7.0;
        assert!(matches!(
            predictor.predict_vector(&FeatureVector::from(values)),
            Err(ChurnError::InvalidCategory {
                field: "plan_type",
                ..
            })
        ));
    }

    #[test]
    fn test_accessors_expose_loaded_artifacts() {
        let predictor = random_predictor(3);
        assert_eq!(predictor.scaler().n_features(), FEATURE_DIM);
        assert_eq!(predictor.scaler().kind(), ScalerKind::Standard);
        assert_eq!(predictor.model().dims(), NetworkDims::default());
    }

    #[test]
    fn test_errors_propagate_unchanged() {
        let predictor = random_predictor(5);

        let mut record = sample_record();
        record.account_status = "Suspended".to_string();
        assert!(matches!(
            predictor.predict(&record),
            Err(crate::ChurnError::InvalidCategory {
                field: "account_status",
                ..
            })
        ));

        assert!(matches!(
            predictor.predict_vector(&FeatureVector::from(vec![0.0; FEATURE_DIM - 1])),
            Err(crate::ChurnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_shared_predictor_failed_load_is_not_cached() {
        let shared = SharedPredictor::new();
        let paths = ArtifactPaths {
            scaler: PathBuf::from("/nonexistent/scaler.json"),
            model: PathBuf::from("/nonexistent/model.json"),
            dims: NetworkDims::default(),
        };
        assert!(shared.get_or_load(&paths).is_err());
        assert!(shared.get().is_none());
    }

    #[test]
    fn test_predictor_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ChurnPredictor>();
        assert_send_sync::<SharedPredictor>();
    }
}
