//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;

use crate::encoder::{parse_record, RawRecord};
use crate::model::{NetworkDims, HIDDEN_DIM};
use crate::pipeline::{ArtifactPaths, DEFAULT_MODEL_PATH, DEFAULT_SCALER_PATH};
use crate::stage::Stage;

/// Customer churn analytics: dataset statistics, model evaluation and churn prediction
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the visualisation-ready dataset CSV
    #[arg(short, long, default_value = "Data/viz_ready.csv")]
    pub input: String,

    /// Dashboard stage to summarise (overview, dissatisfaction, frequency, importance)
    #[arg(short, long, default_value = "overview")]
    pub stage: Stage,

    /// Summarise every stage in navigation order
    #[arg(long)]
    pub all_stages: bool,

    /// Prediction mode: the 10 customer fields as a comma-separated string, in order
    /// failed_call_count,submitted_complaint,months_as_customer,billing_level,call_count,
    /// sms_count,plan_type,account_status,age,customer_value
    /// Example: --predict "0,No,24,Medium,10,20,Contractual,Active,35,500"
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Evaluation mode: labelled CSV with the 10 customer fields plus has_churned
    #[arg(short, long)]
    pub evaluate: Option<String>,

    /// Output path for the confusion matrix plot in evaluation mode
    #[arg(long, default_value = "Outputs/confusion_matrix.png")]
    pub confusion_matrix: String,

    /// Path to the fitted scaler artifact
    #[arg(long, env = "CHURN_SCALER_PATH", default_value = DEFAULT_SCALER_PATH)]
    pub scaler: PathBuf,

    /// Path to the trained model artifact
    #[arg(long, env = "CHURN_MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
    pub model: PathBuf,

    /// Hidden layer width the model was trained with
    #[arg(long, default_value_t = HIDDEN_DIM)]
    pub hidden_dim: usize,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse the customer record from the predict string, if given
    pub fn parse_record(&self) -> crate::Result<Option<RawRecord>> {
        self.predict.as_deref().map(parse_record).transpose()
    }

    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths {
            scaler: self.scaler.clone(),
            model: self.model.clone(),
            dims: NetworkDims {
                hidden: self.hidden_dim,
                ..NetworkDims::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["churnscope"])
    }

    #[test]
    fn test_defaults() {
        let args = base_args();
        assert_eq!(args.input, "Data/viz_ready.csv");
        assert_eq!(args.stage, Stage::Overview);
        assert_eq!(args.hidden_dim, 64);
        assert!(args.predict.is_none());
    }

    #[test]
    fn test_parse_record() {
        let mut args = base_args();
        args.predict = Some("0,No,24,Medium,10,20,Contractual,Active,35,500".to_string());

        let record = args.parse_record().unwrap().unwrap();
        assert_eq!(record.billing_level, "Medium");
        assert_eq!(record.age, 35.0);

        args.predict = None;
        assert!(args.parse_record().unwrap().is_none());

        args.predict = Some("invalid".to_string());
        assert!(args.parse_record().is_err());
    }

    #[test]
    fn test_stage_flag() {
        let args = Args::parse_from(["churnscope", "--stage", "importance"]);
        assert_eq!(args.stage, Stage::Importance);
        assert!(Args::try_parse_from(["churnscope", "--stage", "pricing"]).is_err());
    }

    #[test]
    fn test_artifact_paths() {
        let args = Args::parse_from([
            "churnscope",
            "--scaler",
            "a/scaler.json",
            "--model",
            "b/model.json",
            "--hidden-dim",
            "32",
        ]);
        let paths = args.artifact_paths();
        assert_eq!(paths.scaler, PathBuf::from("a/scaler.json"));
        assert_eq!(paths.model, PathBuf::from("b/model.json"));
        assert_eq!(paths.dims.hidden, 32);
        assert_eq!(paths.dims.input, 10);
    }
}
