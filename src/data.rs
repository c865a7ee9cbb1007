//! Dataset loading and per-stage churn statistics using Polars

use std::fmt;
use std::path::Path;

use polars::prelude::*;

use crate::encoder::BillingLevel;
use crate::error::{ChurnError, Result};
use crate::stage::Stage;

/// Column holding the churn outcome.
pub const CHURN_COLUMN: &str = "has_churned";

/// Value of [`CHURN_COLUMN`] for customers who churned.
pub const CHURN_LABEL: &str = "Churn";

/// Value of [`CHURN_COLUMN`] for retained customers.
pub const NO_CHURN_LABEL: &str = "No Churn";

/// Clients with more failed calls than this count as dissatisfied.
const HIGH_FAILED_CALLS: i64 = 5;

/// Clients with fewer SMS than this count as low-engagement.
const LOW_SMS_COUNT: i64 = 5;

/// Churn and retention counts for one value of a categorical column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub value: String,
    pub churn: usize,
    pub no_churn: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    pub total: usize,
    pub churned: usize,
    pub churn_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dissatisfaction {
    pub avg_failed_calls_churn: f64,
    pub churn_pct_high_failed_calls: f64,
    pub total_complaints: usize,
    pub complaints_churned_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frequency {
    pub avg_call_count_churn: f64,
    pub churn_pct_low_sms: f64,
    pub avg_unique_contacts_churn: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Importance {
    pub billing_level: Vec<CategoryCount>,
    pub plan_type: Vec<CategoryCount>,
}

/// Metrics shown on one dashboard stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageSummary {
    Overview(Overview),
    Dissatisfaction(Dissatisfaction),
    Frequency(Frequency),
    Importance(Importance),
}

/// Historical customer records used for descriptive statistics.
#[derive(Debug, Clone)]
pub struct ChurnDataset {
    df: DataFrame,
}

impl ChurnDataset {
    /// Load the visualisation-ready CSV.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ChurnError::Dataset(format!(
                "dataset not found: {}",
                path.display()
            )));
        }

        let df = LazyCsvReader::new(path)
            .with_has_header(true)
            .finish()?
            .collect()?;

        tracing::debug!(path = %path.display(), rows = df.height(), "loaded churn dataset");
        Self::from_frame(df)
    }

    pub fn from_frame(df: DataFrame) -> Result<Self> {
        let dataset = Self { df };
        dataset.require(CHURN_COLUMN)?;
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    fn require(&self, column: &str) -> Result<()> {
        if self.df.column(column).is_err() {
            return Err(ChurnError::Dataset(format!("missing column `{column}`")));
        }
        Ok(())
    }

    fn churned() -> Expr {
        col(CHURN_COLUMN).eq(lit(CHURN_LABEL))
    }

    fn count_where(&self, predicate: Expr) -> Result<usize> {
        Ok(self.df.clone().lazy().filter(predicate).collect()?.height())
    }

    /// Mean of `column` over rows matching `predicate`; 0 when no row matches.
    fn mean_where(&self, column: &str, predicate: Expr) -> Result<f64> {
        self.require(column)?;
        let out = self
            .df
            .clone()
            .lazy()
            .filter(predicate)
            .select([col(column).cast(DataType::Float64).mean()])
            .collect()?;
        Ok(out.column(column)?.f64()?.get(0).unwrap_or(0.0))
    }

    /// Percentage of rows matching `predicate` that churned; 0 when no row matches.
    fn churn_pct_where(&self, predicate: Expr) -> Result<f64> {
        let total = self.count_where(predicate.clone())?;
        if total == 0 {
            return Ok(0.0);
        }
        let churned = self.count_where(predicate.and(Self::churned()))?;
        Ok(churned as f64 / total as f64 * 100.0)
    }

    pub fn overview(&self) -> Result<Overview> {
        let total = self.len();
        let churned = self.count_where(Self::churned())?;
        let churn_pct = if total > 0 {
            churned as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Ok(Overview {
            total,
            churned,
            churn_pct,
        })
    }

    pub fn dissatisfaction(&self) -> Result<Dissatisfaction> {
        self.require("failed_call_count")?;
        self.require("submitted_complaint")?;

        let complained = || col("submitted_complaint").eq(lit("Yes"));
        Ok(Dissatisfaction {
            avg_failed_calls_churn: self.mean_where("failed_call_count", Self::churned())?,
            churn_pct_high_failed_calls: self
                .churn_pct_where(col("failed_call_count").gt(lit(HIGH_FAILED_CALLS)))?,
            total_complaints: self.count_where(complained())?,
            complaints_churned_pct: self.churn_pct_where(complained())?,
        })
    }

    pub fn frequency(&self) -> Result<Frequency> {
        self.require("sms_count")?;
        Ok(Frequency {
            avg_call_count_churn: self.mean_where("call_count", Self::churned())?,
            churn_pct_low_sms: self.churn_pct_where(col("sms_count").lt(lit(LOW_SMS_COUNT)))?,
            avg_unique_contacts_churn: self
                .mean_where("unique_contacts_called", Self::churned())?,
        })
    }

    pub fn importance(&self) -> Result<Importance> {
        let mut billing_level = self.breakdown("billing_level")?;
        billing_level.sort_by_key(|c| {
            (
                c.value
                    .parse::<BillingLevel>()
                    .map(|b| b as u8)
                    .unwrap_or(u8::MAX),
                c.value.clone(),
            )
        });
        Ok(Importance {
            billing_level,
            plan_type: self.breakdown("plan_type")?,
        })
    }

    /// Churn and retention counts per distinct value of `column`, sorted by value.
    pub fn breakdown(&self, column: &str) -> Result<Vec<CategoryCount>> {
        self.require(column)?;
        let out = self
            .df
            .clone()
            .lazy()
            .group_by([col(column)])
            .agg([
                Self::churned()
                    .cast(DataType::Int64)
                    .sum()
                    .alias("churn"),
                col(CHURN_COLUMN)
                    .neq(lit(CHURN_LABEL))
                    .cast(DataType::Int64)
                    .sum()
                    .alias("no_churn"),
            ])
            .collect()?;

        let keys = out.column(column)?.cast(&DataType::String)?;
        let churn = out.column("churn")?.cast(&DataType::Int64)?;
        let no_churn = out.column("no_churn")?.cast(&DataType::Int64)?;

        let mut counts: Vec<CategoryCount> = keys
            .str()?
            .into_iter()
            .zip(churn.i64()?.into_iter())
            .zip(no_churn.i64()?.into_iter())
            .map(|((value, churn), no_churn)| CategoryCount {
                value: value.unwrap_or("<missing>").to_string(),
                churn: churn.unwrap_or(0).max(0) as usize,
                no_churn: no_churn.unwrap_or(0).max(0) as usize,
            })
            .collect();
        counts.sort_by(|a, b| a.value.cmp(&b.value));
        Ok(counts)
    }

    /// Metrics for one dashboard stage.
    pub fn summary(&self, stage: Stage) -> Result<StageSummary> {
        Ok(match stage {
            Stage::Overview => StageSummary::Overview(self.overview()?),
            Stage::Dissatisfaction => StageSummary::Dissatisfaction(self.dissatisfaction()?),
            Stage::Frequency => StageSummary::Frequency(self.frequency()?),
            Stage::Importance => StageSummary::Importance(self.importance()?),
        })
    }
}

fn write_breakdown(f: &mut fmt::Formatter<'_>, title: &str, counts: &[CategoryCount]) -> fmt::Result {
    writeln!(f, "{title}:")?;
    writeln!(f, "  {:<16} | {:>7} | {:>8}", "Value", CHURN_LABEL, NO_CHURN_LABEL)?;
    writeln!(f, "  -----------------|---------|---------")?;
    for c in counts {
        writeln!(f, "  {:<16} | {:>7} | {:>8}", c.value, c.churn, c.no_churn)?;
    }
    Ok(())
}

impl fmt::Display for StageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageSummary::Overview(o) => {
                writeln!(f, "Total Clients: {}", o.total)?;
                writeln!(f, "Churn Clients: {}", o.churned)?;
                writeln!(f, "% Churn: {:.2}%", o.churn_pct)
            }
            StageSummary::Dissatisfaction(d) => {
                writeln!(f, "Avg Failed Calls (Churn): {:.1}", d.avg_failed_calls_churn)?;
                writeln!(
                    f,
                    "% Churn w/ >{} Failed Calls: {:.1}%",
                    HIGH_FAILED_CALLS, d.churn_pct_high_failed_calls
                )?;
                writeln!(f, "Total Complaints: {}", d.total_complaints)?;
                writeln!(f, "% Complaints Churned: {:.1}%", d.complaints_churned_pct)
            }
            StageSummary::Frequency(q) => {
                writeln!(f, "Avg Call Count (Churn): {:.1}", q.avg_call_count_churn)?;
                writeln!(f, "% Churn w/ <{} SMS: {:.1}%", LOW_SMS_COUNT, q.churn_pct_low_sms)?;
                writeln!(
                    f,
                    "Avg Unique Contacts (Churn): {:.1}",
                    q.avg_unique_contacts_churn
                )
            }
            StageSummary::Importance(i) => {
                write_breakdown(f, "Billing Level", &i.billing_level)?;
                write_breakdown(f, "Plan Type", &i.plan_type)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "failed_call_count,submitted_complaint,months_as_customer,billing_level,call_count,sms_count,plan_type,account_status,age,customer_value,unique_contacts_called,has_churned").unwrap();
        writeln!(file, "8,Yes,10,Low,5,2,Pay as you go,No Active,25,100.5,3,Churn").unwrap();
        writeln!(file, "6,No,12,Medium,15,3,Pay as you go,Active,30,200.0,5,Churn").unwrap();
        writeln!(file, "7,Yes,30,VIP,40,60,Contractual,Active,45,1500.0,20,No Churn").unwrap();
        writeln!(file, "0,No,40,Low,30,80,Contractual,Active,50,900.0,15,No Churn").unwrap();
        file
    }

    fn load_test_dataset() -> (NamedTempFile, ChurnDataset) {
        let file = create_test_csv();
        let dataset = ChurnDataset::load(file.path()).unwrap();
        (file, dataset)
    }

    #[test]
    fn test_overview() {
        let (_file, dataset) = load_test_dataset();
        let overview = dataset.overview().unwrap();
        assert_eq!(overview.total, 4);
        assert_eq!(overview.churned, 2);
        assert!((overview.churn_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_dissatisfaction() {
        let (_file, dataset) = load_test_dataset();
        let d = dataset.dissatisfaction().unwrap();
        assert!((d.avg_failed_calls_churn - 7.0).abs() < 1e-9);
        // 3 clients with >5 failed calls, 2 of them churned
        assert!((d.churn_pct_high_failed_calls - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(d.total_complaints, 2);
        assert!((d.complaints_churned_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_frequency() {
        let (_file, dataset) = load_test_dataset();
        let q = dataset.frequency().unwrap();
        assert!((q.avg_call_count_churn - 10.0).abs() < 1e-9);
        assert!((q.churn_pct_low_sms - 100.0).abs() < 1e-9);
        assert!((q.avg_unique_contacts_churn - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_importance_breakdown() {
        let (_file, dataset) = load_test_dataset();
        let i = dataset.importance().unwrap();

        let values: Vec<&str> = i.billing_level.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["Low", "Medium", "VIP"]);
        assert_eq!(
            i.billing_level[0],
            CategoryCount {
                value: "Low".to_string(),
                churn: 1,
                no_churn: 1,
            }
        );

        let plans: Vec<(&str, usize, usize)> = i
            .plan_type
            .iter()
            .map(|c| (c.value.as_str(), c.churn, c.no_churn))
            .collect();
        assert_eq!(plans, vec![("Contractual", 0, 2), ("Pay as you go", 2, 0)]);
    }

    #[test]
    fn test_summary_per_stage() {
        let (_file, dataset) = load_test_dataset();
        for stage in Stage::ALL {
            let summary = dataset.summary(stage).unwrap();
            assert!(!summary.to_string().is_empty());
        }
    }

    #[test]
    fn test_missing_churn_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "failed_call_count,sms_count").unwrap();
        writeln!(file, "1,2").unwrap();
        assert!(matches!(
            ChurnDataset::load(file.path()),
            Err(ChurnError::Dataset(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(ChurnDataset::load("/nonexistent/viz_ready.csv").is_err());
    }
}
