//! churnscope: customer churn analytics and single-record churn inference
//!
//! The inference pipeline encodes a raw customer record into a fixed-order
//! feature vector, applies a fitted scaler, runs a small feed-forward network
//! and thresholds the resulting probability. Around it sit offline evaluation
//! of the classifier and descriptive statistics over the historical dataset.

pub mod cli;
pub mod data;
pub mod encoder;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod pipeline;
pub mod scaler;
pub mod stage;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{ChurnDataset, StageSummary};
pub use encoder::{encode, parse_record, FeatureVector, RawRecord, FEATURE_DIM, FEATURE_NAMES};
pub use error::{ChurnError, Result};
pub use evaluation::{
    evaluate, load_labelled_records, render_confusion_matrix, EvaluationReport, LabelledRecord,
};
pub use model::{Mode, ModelParameters, NetworkDims};
pub use pipeline::{ArtifactPaths, ChurnPredictor, Prediction, SharedPredictor, CHURN_THRESHOLD};
pub use scaler::{ScalerKind, ScalerParameters};
pub use stage::Stage;
