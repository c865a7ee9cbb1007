//! Feed-forward churn classifier
//!
//! # Architecture
//!
//! ```text
//! Input (10) → Linear(64) → ReLU → Dropout
//!            → Linear(64) → ReLU → Dropout
//!            → Linear(64) → ReLU
//!            → Linear(1)  → Sigmoid
//! ```
//!
//! Parameters are plain data. Dropout is applied only when [`Mode::Training`]
//! is passed to the forward pass; [`Mode::Inference`] is fully deterministic.

use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::encoder::{FeatureVector, FEATURE_DIM};
use crate::error::{ChurnError, Result};

/// Hidden layer width of the deployed model.
pub const HIDDEN_DIM: usize = 64;

/// Dropout rate the deployed model was trained with.
pub const DEFAULT_DROPOUT_RATE: f64 = 0.3;

/// Layer names as they appear in the state dict.
const LAYER_NAMES: [&str; 4] = ["fc1", "fc2", "fc3", "fc4"];

/// Largest f64 strictly below 1.0.
const PROB_CEIL: f64 = 1.0 - f64::EPSILON / 2.0;

/// Declared network dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkDims {
    pub input: usize,
    pub hidden: usize,
    pub output: usize,
}

impl Default for NetworkDims {
    fn default() -> Self {
        Self {
            input: FEATURE_DIM,
            hidden: HIDDEN_DIM,
            output: 1,
        }
    }
}

impl NetworkDims {
    /// Expected `[out, in]` weight shape per layer.
    fn weight_shapes(&self) -> [[usize; 2]; 4] {
        [
            [self.hidden, self.input],
            [self.hidden, self.hidden],
            [self.hidden, self.hidden],
            [self.output, self.hidden],
        ]
    }
}

/// Forward pass mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Dropout disabled.
    Inference,
    /// Inverted dropout after the first two hidden layers, drawn from an RNG seeded with `seed`.
    Training { dropout_rate: f64, seed: u64 },
}

/// One fully connected layer, weights in `[out, in]` layout.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    weight: Array2<f64>,
    bias: Array1<f64>,
}

impl DenseLayer {
    pub fn new(weight: Array2<f64>, bias: Array1<f64>) -> Result<Self> {
        if weight.nrows() != bias.len() {
            return Err(ChurnError::DimensionMismatch {
                layer: "bias".to_string(),
                expected: vec![weight.nrows()],
                actual: vec![bias.len()],
            });
        }
        Ok(Self { weight, bias })
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    fn forward(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        self.weight.dot(&x) + &self.bias
    }
}

/// Persisted state dict, keyed the same way PyTorch names `nn.Linear` parameters.
#[derive(Debug, Serialize, Deserialize)]
struct StateDict {
    #[serde(rename = "fc1.weight")]
    fc1_weight: Vec<Vec<f64>>,
    #[serde(rename = "fc1.bias")]
    fc1_bias: Vec<f64>,
    #[serde(rename = "fc2.weight")]
    fc2_weight: Vec<Vec<f64>>,
    #[serde(rename = "fc2.bias")]
    fc2_bias: Vec<f64>,
    #[serde(rename = "fc3.weight")]
    fc3_weight: Vec<Vec<f64>>,
    #[serde(rename = "fc3.bias")]
    fc3_bias: Vec<f64>,
    #[serde(rename = "fc4.weight")]
    fc4_weight: Vec<Vec<f64>>,
    #[serde(rename = "fc4.bias")]
    fc4_bias: Vec<f64>,
}

impl StateDict {
    fn into_layers(self) -> [(Vec<Vec<f64>>, Vec<f64>); 4] {
        [
            (self.fc1_weight, self.fc1_bias),
            (self.fc2_weight, self.fc2_bias),
            (self.fc3_weight, self.fc3_bias),
            (self.fc4_weight, self.fc4_bias),
        ]
    }

    fn from_layers(layers: &[DenseLayer; 4]) -> Self {
        let rows = |layer: &DenseLayer| -> Vec<Vec<f64>> {
            layer.weight.outer_iter().map(|row| row.to_vec()).collect()
        };
        Self {
            fc1_weight: rows(&layers[0]),
            fc1_bias: layers[0].bias.to_vec(),
            fc2_weight: rows(&layers[1]),
            fc2_bias: layers[1].bias.to_vec(),
            fc3_weight: rows(&layers[2]),
            fc3_bias: layers[2].bias.to_vec(),
            fc4_weight: rows(&layers[3]),
            fc4_bias: layers[3].bias.to_vec(),
        }
    }
}

/// Immutable weights and biases of the four dense layers.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    layers: [DenseLayer; 4],
}

impl ModelParameters {
    /// Assemble a network from its layers, checking that consecutive widths agree.
    pub fn new(layers: [DenseLayer; 4]) -> Result<Self> {
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[1].in_features() != pair[0].out_features() {
                return Err(ChurnError::DimensionMismatch {
                    layer: LAYER_NAMES[i + 1].to_string(),
                    expected: vec![pair[1].out_features(), pair[0].out_features()],
                    actual: vec![pair[1].out_features(), pair[1].in_features()],
                });
            }
        }
        Ok(Self { layers })
    }

    /// Load a state dict artifact and check every tensor against `dims`.
    pub fn load(path: impl AsRef<Path>, dims: NetworkDims) -> Result<Self> {
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
        let state: StateDict = serde_json::from_str(&raw).map_err(|e| corrupt(e.to_string()))?;

        let expected_shapes = dims.weight_shapes();
        let mut layers = Vec::with_capacity(LAYER_NAMES.len());

        for (idx, (rows, bias)) in state.into_layers().into_iter().enumerate() {
            let name = LAYER_NAMES[idx];
            let weight = matrix_from_rows(rows).map_err(|reason| corrupt(format!("{name}.weight: {reason}")))?;
            if weight.iter().chain(bias.iter()).any(|v| !v.is_finite()) {
                return Err(corrupt(format!("{name} contains non-finite values")));
            }

            let expected = expected_shapes[idx];
            if weight.shape() != expected {
                return Err(ChurnError::DimensionMismatch {
                    layer: format!("{name}.weight"),
                    expected: expected.to_vec(),
                    actual: weight.shape().to_vec(),
                });
            }
            if bias.len() != expected[0] {
                return Err(ChurnError::DimensionMismatch {
                    layer: format!("{name}.bias"),
                    expected: vec![expected[0]],
                    actual: vec![bias.len()],
                });
            }

            layers.push(DenseLayer {
                weight,
                bias: Array1::from(bias),
            });
        }

        let layers: [DenseLayer; 4] = layers
            .try_into()
            .map_err(|_| corrupt("expected exactly four layers".to_string()))?;

        tracing::debug!(
            path = %path.display(),
            input = dims.input,
            hidden = dims.hidden,
            output = dims.output,
            "loaded model parameters"
        );

        Ok(Self { layers })
    }

    /// Write the parameters as a state dict artifact.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let failed = |reason: String| ChurnError::ArtifactCorrupt {
            path: path.to_path_buf(),
            reason,
        };
        let json = serde_json::to_string(&StateDict::from_layers(&self.layers))
            .map_err(|e| failed(e.to_string()))?;
        fs::write(path, json).map_err(|e| failed(e.to_string()))
    }

    /// Randomly initialised network: Kaiming-uniform weights (ReLU gain, fan-in mode)
    /// and zero biases.
    pub fn kaiming_uniform(dims: NetworkDims, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let layers = dims.weight_shapes().map(|[out, fan_in]| {
            let bound = (6.0 / fan_in.max(1) as f64).sqrt();
            let weight = Array2::from_shape_fn((out, fan_in), |_| rng.gen_range(-bound..=bound));
            DenseLayer {
                weight,
                bias: Array1::zeros(out),
            }
        });
        Self { layers }
    }

    pub fn dims(&self) -> NetworkDims {
        NetworkDims {
            input: self.layers[0].in_features(),
            hidden: self.layers[0].out_features(),
            output: self.layers[3].out_features(),
        }
    }

    /// Sigmoid output of every unit in the final layer.
    pub fn forward_scores(&self, features: &FeatureVector, mode: Mode) -> Result<Array1<f64>> {
        let input_dim = self.layers[0].in_features();
        if features.len() != input_dim {
            return Err(ChurnError::DimensionMismatch {
                layer: "input".to_string(),
                expected: vec![input_dim],
                actual: vec![features.len()],
            });
        }
        if let Some(idx) = features.values().iter().position(|x| !x.is_finite()) {
            return Err(ChurnError::InvalidInput(format!(
                "input feature {idx} is not finite"
            )));
        }

        let mut dropout = match mode {
            Mode::Inference => None,
            Mode::Training { dropout_rate, seed } => {
                if !(0.0..1.0).contains(&dropout_rate) {
                    return Err(ChurnError::InvalidInput(format!(
                        "dropout rate {dropout_rate} must be in [0, 1)"
                    )));
                }
                Some((dropout_rate, StdRng::seed_from_u64(seed)))
            }
        };

        let mut h = relu(self.layers[0].forward(features.values()));
        if let Some((rate, rng)) = dropout.as_mut() {
            apply_dropout(&mut h, *rate, rng);
        }
        h = relu(self.layers[1].forward(h.view()));
        if let Some((rate, rng)) = dropout.as_mut() {
            apply_dropout(&mut h, *rate, rng);
        }
        h = relu(self.layers[2].forward(h.view()));

        Ok(self.layers[3].forward(h.view()).mapv_into(sigmoid))
    }

    /// Churn probability for a scaled feature vector. Requires a single output unit.
    pub fn forward(&self, features: &FeatureVector, mode: Mode) -> Result<f64> {
        let output_dim = self.layers[3].out_features();
        if output_dim != 1 {
            return Err(ChurnError::DimensionMismatch {
                layer: "fc4.weight".to_string(),
                expected: vec![1, self.layers[3].in_features()],
                actual: vec![output_dim, self.layers[3].in_features()],
            });
        }
        let scores = self.forward_scores(features, mode)?;
        Ok(scores[0])
    }
}

fn matrix_from_rows(rows: Vec<Vec<f64>>) -> std::result::Result<Array2<f64>, String> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().position(|r| r.len() != n_cols) {
        return Err(format!(
            "row {} has {} columns, expected {}",
            bad,
            rows[bad].len(),
            n_cols
        ));
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n_rows, n_cols), flat).map_err(|e| e.to_string())
}

fn relu(x: Array1<f64>) -> Array1<f64> {
    x.mapv_into(|v| v.max(0.0))
}

fn apply_dropout(x: &mut Array1<f64>, rate: f64, rng: &mut StdRng) {
    let keep = 1.0 - rate;
    x.mapv_inplace(|v| if rng.gen::<f64>() < rate { 0.0 } else { v / keep });
}

/// Logistic sigmoid, kept strictly inside (0, 1) even for saturated inputs.
fn sigmoid(z: f64) -> f64 {
    let p = if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    };
    p.clamp(f64::MIN_POSITIVE, PROB_CEIL)
}
