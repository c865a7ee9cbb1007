//! Offline evaluation of the churn classifier over a labelled dataset
//!
//! Computes confusion-matrix-derived metrics from predicted and ground-truth
//! churn labels and renders the confusion matrix as a PNG heatmap.

use std::fmt;
use std::path::Path;

use plotters::prelude::*;
use polars::prelude::{DataFrame, DataType, LazyCsvReader, LazyFileListReader};

use crate::data::{CHURN_COLUMN, CHURN_LABEL, NO_CHURN_LABEL};
use crate::encoder::{RawRecord, FEATURE_NAMES};
use crate::error::{ChurnError, Result};
use crate::pipeline::ChurnPredictor;

/// A raw record together with its observed outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledRecord {
    pub record: RawRecord,
    pub churned: bool,
}

/// Metrics computed from a confusion matrix. Churn is the positive class.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub fpr: f64,
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_count: usize,
}

impl EvaluationReport {
    /// Build a report from `(predicted, actual)` pairs.
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = (bool, bool)>) -> Self {
        let mut tp: usize = 0;
        let mut fp: usize = 0;
        let mut tn: usize = 0;
        let mut fn_count: usize = 0;

        for (predicted, actual) in outcomes {
            match (predicted, actual) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, false) => tn += 1,
                (false, true) => fn_count += 1,
            }
        }

        let ratio = |num: usize, den: usize| {
            if den > 0 {
                num as f64 / den as f64
            } else {
                0.0
            }
        };

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_count);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy: ratio(tp + tn, tp + fp + tn + fn_count),
            precision,
            recall,
            f1,
            fpr: ratio(fp, fp + tn),
            tp,
            fp,
            tn,
            fn_count,
        }
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_count
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "acc={:.4} prec={:.4} rec={:.4} f1={:.4} fpr={:.4} (tp={} fp={} tn={} fn={})",
            self.accuracy,
            self.precision,
            self.recall,
            self.f1,
            self.fpr,
            self.tp,
            self.fp,
            self.tn,
            self.fn_count,
        )
    }
}

/// Run the predictor over every labelled record.
///
/// The first record that fails to encode or predict aborts the evaluation.
pub fn evaluate(predictor: &ChurnPredictor, records: &[LabelledRecord]) -> Result<EvaluationReport> {
    let outcomes = records
        .iter()
        .map(|r| Ok((predictor.predict(&r.record)?.churn, r.churned)))
        .collect::<Result<Vec<_>>>()?;

    let report = EvaluationReport::from_outcomes(outcomes);
    tracing::info!(samples = report.total(), %report, "evaluation complete");
    Ok(report)
}

fn parse_outcome(row: usize, value: &str) -> Result<bool> {
    match value.trim() {
        CHURN_LABEL | "1" | "true" => Ok(true),
        NO_CHURN_LABEL | "0" | "false" => Ok(false),
        other => Err(ChurnError::InvalidInput(format!(
            "row {row}: unrecognised {CHURN_COLUMN} value {other:?}"
        ))),
    }
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    series
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| ChurnError::InvalidInput(format!("row {row}: missing `{name}`")))
        })
        .collect()
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df.column(name)?.cast(&DataType::String)?;
    series
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.map(str::to_string)
                .ok_or_else(|| ChurnError::InvalidInput(format!("row {row}: missing `{name}`")))
        })
        .collect()
}

/// Load raw records plus the `has_churned` outcome from a CSV file.
///
/// Every feature column must be present and non-null in every row.
pub fn load_labelled_records(path: impl AsRef<Path>) -> Result<Vec<LabelledRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ChurnError::Dataset(format!(
            "evaluation data not found: {}",
            path.display()
        )));
    }

    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .finish()?
        .collect()?;

    for name in FEATURE_NAMES.iter().chain([&CHURN_COLUMN]) {
        if df.column(name).is_err() {
            return Err(ChurnError::InvalidInput(format!(
                "{} is missing column `{name}`",
                path.display()
            )));
        }
    }

    let failed_call_count = numeric_column(&df, "failed_call_count")?;
    let submitted_complaint = string_column(&df, "submitted_complaint")?;
    let months_as_customer = numeric_column(&df, "months_as_customer")?;
    let billing_level = string_column(&df, "billing_level")?;
    let call_count = numeric_column(&df, "call_count")?;
    let sms_count = numeric_column(&df, "sms_count")?;
    let plan_type = string_column(&df, "plan_type")?;
    let account_status = string_column(&df, "account_status")?;
    let age = numeric_column(&df, "age")?;
    let customer_value = numeric_column(&df, "customer_value")?;
    let outcomes = string_column(&df, CHURN_COLUMN)?;

    let records = (0..df.height())
        .map(|row| {
            Ok(LabelledRecord {
                record: RawRecord {
                    failed_call_count: failed_call_count[row],
                    submitted_complaint: submitted_complaint[row].clone(),
                    months_as_customer: months_as_customer[row],
                    billing_level: billing_level[row].clone(),
                    call_count: call_count[row],
                    sms_count: sms_count[row],
                    plan_type: plan_type[row].clone(),
                    account_status: account_status[row].clone(),
                    age: age[row],
                    customer_value: customer_value[row],
                },
                churned: parse_outcome(row, &outcomes[row])?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(path = %path.display(), rows = records.len(), "loaded labelled records");
    Ok(records)
}

fn render_err<E: fmt::Display>(err: E) -> ChurnError {
    ChurnError::Render(err.to_string())
}

/// Render the 2x2 confusion matrix as a PNG heatmap.
///
/// Rows are the actual class (No Churn on top), columns the predicted class
/// (No Churn on the left).
pub fn render_confusion_matrix(report: &EvaluationReport, output_path: impl AsRef<Path>) -> Result<()> {
    let output_path = output_path.as_ref();
    let root = BitMapBackend::new(output_path, (600, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Confusion Matrix", ("sans-serif", 30))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..2f64, 0f64..2f64)
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(0)
        .y_labels(0)
        .x_desc(format!("Predicted ({NO_CHURN_LABEL} | {CHURN_LABEL})"))
        .y_desc(format!("Actual ({CHURN_LABEL} | {NO_CHURN_LABEL})"))
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(render_err)?;

    // (x, y, label, count) with y = 1 as the top row
    let cells = [
        (0.0, 1.0, "TN", report.tn),
        (1.0, 1.0, "FP", report.fp),
        (0.0, 0.0, "FN", report.fn_count),
        (1.0, 0.0, "TP", report.tp),
    ];
    let max_count = cells.iter().map(|c| c.3).max().unwrap_or(0).max(1) as f64;

    for &(x, y, label, count) in &cells {
        let shade = count as f64 / max_count;
        let color = RGBColor(
            255 - (shade * 200.0) as u8,
            255 - (shade * 120.0) as u8,
            255,
        );
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(x, y), (x + 1.0, y + 1.0)],
                color.filled(),
            )))
            .map_err(render_err)?;
        chart
            .draw_series(std::iter::once(Text::new(
                format!("{label}: {count}"),
                (x + 0.35, y + 0.55),
                ("sans-serif", 24),
            )))
            .map_err(render_err)?;
    }

    root.present().map_err(render_err)?;
    tracing::info!(path = %output_path.display(), "confusion matrix saved");
    Ok(())
}
