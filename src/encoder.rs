//! Feature encoding: raw customer fields to the fixed-order model input
//!
//! # Feature Vector Layout (10 dimensions)
//!
//! | Index | Feature              | Encoding                         |
//! |-------|----------------------|----------------------------------|
//! | 0     | `failed_call_count`  | passthrough, >= 0                |
//! | 1     | `submitted_complaint`| No=0, Yes=1                      |
//! | 2     | `months_as_customer` | passthrough, >= 0                |
//! | 3     | `billing_level`      | ordinal 0..9 (Very Low .. VIP)   |
//! | 4     | `call_count`         | passthrough, >= 0                |
//! | 5     | `sms_count`          | passthrough, >= 0                |
//! | 6     | `plan_type`          | Pay as you go=0, Contractual=1   |
//! | 7     | `account_status`     | Active=0, No Active=1            |
//! | 8     | `age`                | passthrough, 0..=100             |
//! | 9     | `customer_value`     | passthrough, 0..=2175            |

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{ChurnError, Result};

/// Number of features produced by [`encode`].
pub const FEATURE_DIM: usize = 10;

/// Feature names in model input order. The scaler must have been fitted on this order.
pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "failed_call_count",
    "submitted_complaint",
    "months_as_customer",
    "billing_level",
    "call_count",
    "sms_count",
    "plan_type",
    "account_status",
    "age",
    "customer_value",
];

/// Upper bound on `age` accepted by the input surface.
pub const MAX_AGE: f64 = 100.0;

/// Upper bound on `customer_value` accepted by the input surface.
pub const MAX_CUSTOMER_VALUE: f64 = 2175.0;

macro_rules! categorical {
    (
        $(#[$meta:meta])*
        $name:ident, field = $field:literal {
            $($variant:ident => $label:literal = $code:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant = $code),+
        }

        impl $name {
            /// Column name of this field.
            pub const FIELD: &'static str = $field;

            /// Every level, in code order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The string shown to and entered by users.
            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Numeric code fed to the model.
            pub fn code(self) -> f64 {
                f64::from(self as u8)
            }
        }

        impl FromStr for $name {
            type Err = ChurnError;

            fn from_str(raw: &str) -> Result<Self> {
                match raw.trim() {
                    $($label => Ok($name::$variant),)+
                    other => Err(ChurnError::InvalidCategory {
                        field: $field,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

categorical! {
    /// Whether the customer filed a complaint.
    Complaint, field = "submitted_complaint" {
        No => "No" = 0,
        Yes => "Yes" = 1,
    }
}

categorical! {
    /// Ordinal billing tier.
    BillingLevel, field = "billing_level" {
        VeryLow => "Very Low" = 0,
        Low => "Low" = 1,
        MidLow => "Mid-Low" = 2,
        Medium => "Medium" = 3,
        MidHigh => "Mid-High" = 4,
        High => "High" = 5,
        HighPlus => "High+" = 6,
        VeryHigh => "Very High" = 7,
        Premium => "Premium" = 8,
        Vip => "VIP" = 9,
    }
}

categorical! {
    PlanType, field = "plan_type" {
        PayAsYouGo => "Pay as you go" = 0,
        Contractual => "Contractual" = 1,
    }
}

categorical! {
    AccountStatus, field = "account_status" {
        Active => "Active" = 0,
        NoActive => "No Active" = 1,
    }
}

/// One customer as entered in the prediction form or read from a CSV row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub failed_call_count: f64,
    pub submitted_complaint: String,
    pub months_as_customer: f64,
    pub billing_level: String,
    pub call_count: f64,
    pub sms_count: f64,
    pub plan_type: String,
    pub account_status: String,
    pub age: f64,
    pub customer_value: f64,
}

/// Fixed-order numeric model input.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Array1<f64>);

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> ArrayView1<'_, f64> {
        self.0.view()
    }

    pub fn as_slice(&self) -> &[f64] {
        self.0.as_slice().unwrap_or(&[])
    }

    /// Look up a feature by name. Only meaningful for vectors in [`FEATURE_NAMES`] order.
    pub fn get(&self, name: &str) -> Option<f64> {
        let idx = FEATURE_NAMES.iter().position(|n| *n == name)?;
        self.0.get(idx).copied()
    }

    /// Check an already encoded vector against the encoder's output domain:
    /// exactly [`FEATURE_DIM`] values, numeric fields within their bounds and
    /// categorical codes among their enumerated levels.
    pub fn check_domain(&self) -> Result<()> {
        if self.len() != FEATURE_DIM {
            return Err(ChurnError::ShapeMismatch {
                expected: FEATURE_DIM,
                actual: self.len(),
            });
        }

        for (idx, &value) in self.0.iter().enumerate() {
            let field = FEATURE_NAMES[idx];
            match CATEGORICAL_LEVELS[idx] {
                Some(levels) => {
                    if value.fract() != 0.0 || !(0.0..levels as f64).contains(&value) {
                        return Err(ChurnError::InvalidCategory {
                            field,
                            value: value.to_string(),
                        });
                    }
                }
                None => {
                    check_range(field, value, FEATURE_MAX[idx])?;
                }
            }
        }
        Ok(())
    }
}

/// Number of levels for categorical positions, `None` for numeric ones.
const CATEGORICAL_LEVELS: [Option<usize>; FEATURE_DIM] = [
    None,
    Some(Complaint::ALL.len()),
    None,
    Some(BillingLevel::ALL.len()),
    None,
    None,
    Some(PlanType::ALL.len()),
    Some(AccountStatus::ALL.len()),
    None,
    None,
];

/// Upper bound per numeric position.
const FEATURE_MAX: [f64; FEATURE_DIM] = [
    f64::MAX,
    1.0,
    f64::MAX,
    9.0,
    f64::MAX,
    f64::MAX,
    1.0,
    1.0,
    MAX_AGE,
    MAX_CUSTOMER_VALUE,
];

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        FeatureVector(Array1::from(values))
    }
}

impl From<Array1<f64>> for FeatureVector {
    fn from(values: Array1<f64>) -> Self {
        FeatureVector(values)
    }
}

fn check_range(field: &'static str, value: f64, max: f64) -> Result<f64> {
    if value.is_finite() && (0.0..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ChurnError::InvalidRange {
            field,
            value,
            min: 0.0,
            max,
        })
    }
}

/// Encode a raw record into the 10-feature vector.
///
/// Categorical strings must match one of their enumerated labels exactly and
/// numeric fields must lie within their declared bounds; nothing is coerced.
pub fn encode(record: &RawRecord) -> Result<FeatureVector> {
    let complaint: Complaint = record.submitted_complaint.parse()?;
    let billing: BillingLevel = record.billing_level.parse()?;
    let plan: PlanType = record.plan_type.parse()?;
    let status: AccountStatus = record.account_status.parse()?;

    let values = vec![
        check_range("failed_call_count", record.failed_call_count, f64::MAX)?,
        complaint.code(),
        check_range("months_as_customer", record.months_as_customer, f64::MAX)?,
        billing.code(),
        check_range("call_count", record.call_count, f64::MAX)?,
        check_range("sms_count", record.sms_count, f64::MAX)?,
        plan.code(),
        status.code(),
        check_range("age", record.age, MAX_AGE)?,
        check_range("customer_value", record.customer_value, MAX_CUSTOMER_VALUE)?,
    ];

    Ok(FeatureVector::from(values))
}

/// Parse a comma-separated record in [`FEATURE_NAMES`] order.
///
/// Example: `"0,No,24,Medium,10,20,Contractual,Active,35,500"`
pub fn parse_record(input: &str) -> Result<RawRecord> {
    let parts: Vec<&str> = input.split(',').map(str::trim).collect();
    if parts.len() != FEATURE_DIM {
        return Err(ChurnError::InvalidInput(format!(
            "expected {} comma-separated fields ({}), got {}",
            FEATURE_DIM,
            FEATURE_NAMES.join(","),
            parts.len()
        )));
    }

    let number = |idx: usize| -> Result<f64> {
        parts[idx].parse::<f64>().map_err(|_| {
            ChurnError::InvalidInput(format!(
                "invalid {} value: {}",
                FEATURE_NAMES[idx], parts[idx]
            ))
        })
    };

    Ok(RawRecord {
        failed_call_count: number(0)?,
        submitted_complaint: parts[1].to_string(),
        months_as_customer: number(2)?,
        billing_level: parts[3].to_string(),
        call_count: number(4)?,
        sms_count: number(5)?,
        plan_type: parts[6].to_string(),
        account_status: parts[7].to_string(),
        age: number(8)?,
        customer_value: number(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

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

    #[test]
    fn test_encode_sample_record() {
        let features = encode(&sample_record()).unwrap();
        assert_eq!(
            features.as_slice(),
            &[0.0, 0.0, 24.0, 3.0, 10.0, 20.0, 1.0, 0.0, 35.0, 500.0]
        );
        assert_eq!(features.get("billing_level"), Some(3.0));
        assert_eq!(features.get("unknown"), None);
    }

    #[test]
    fn test_billing_levels_are_distinct_ordinals() {
        let codes: Vec<f64> = BillingLevel::ALL.iter().map(|b| b.code()).collect();
        assert_eq!(codes, (0..10).map(f64::from).collect::<Vec<_>>());

        let labels: HashSet<&str> = BillingLevel::ALL.iter().map(|b| b.label()).collect();
        assert_eq!(labels.len(), 10);

        assert_eq!("VIP".parse::<BillingLevel>().unwrap().code(), 9.0);
        assert_eq!("Very Low".parse::<BillingLevel>().unwrap().code(), 0.0);
    }

    #[test]
    fn test_binary_categoricals() {
        assert_eq!("Yes".parse::<Complaint>().unwrap().code(), 1.0);
        assert_eq!("No".parse::<Complaint>().unwrap().code(), 0.0);
        assert_eq!("Pay as you go".parse::<PlanType>().unwrap().code(), 0.0);
        assert_eq!("Contractual".parse::<PlanType>().unwrap().code(), 1.0);
        assert_eq!("Active".parse::<AccountStatus>().unwrap().code(), 0.0);
        assert_eq!("No Active".parse::<AccountStatus>().unwrap().code(), 1.0);
    }

    #[test]
    fn test_label_round_trips_through_from_str() {
        for level in BillingLevel::ALL {
            assert_eq!(level.label().parse::<BillingLevel>().unwrap(), *level);
        }
    }

    #[test]
    fn test_unknown_category_rejected() {
        let mut record = sample_record();
        record.billing_level = "Ultra".to_string();
        match encode(&record) {
            Err(ChurnError::InvalidCategory { field, value }) => {
                assert_eq!(field, "billing_level");
                assert_eq!(value, "Ultra");
            }
            other => panic!("expected InvalidCategory, got {:?}", other),
        }

        // Matching is case-sensitive
        assert!("vip".parse::<BillingLevel>().is_err());
        assert!("yes".parse::<Complaint>().is_err());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut record = sample_record();
        record.age = 101.0;
        assert!(matches!(
            encode(&record),
            Err(ChurnError::InvalidRange { field: "age", .. })
        ));

        let mut record = sample_record();
        record.customer_value = 2175.5;
        assert!(matches!(
            encode(&record),
            Err(ChurnError::InvalidRange { field: "customer_value", .. })
        ));

        let mut record = sample_record();
        record.call_count = -1.0;
        assert!(matches!(
            encode(&record),
            Err(ChurnError::InvalidRange { field: "call_count", .. })
        ));

        let mut record = sample_record();
        record.sms_count = f64::NAN;
        assert!(encode(&record).is_err());
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let mut record = sample_record();
        record.age = 100.0;
        record.customer_value = 2175.0;
        assert!(encode(&record).is_ok());
    }

    #[test]
    fn test_check_domain() {
        assert!(encode(&sample_record()).unwrap().check_domain().is_ok());

        let mut values = vec![0.0, 0.0, 24.0, 3.0, 10.0, 20.0, 1.0, 0.0, 35.0, 500.0];
        values[9] = f64::NAN;
        assert!(matches!(
            FeatureVector::from(values.clone()).check_domain(),
            Err(ChurnError::InvalidRange { field: "customer_value", .. })
        ));

        values[9] = -5000.0;
        assert!(matches!(
            FeatureVector::from(values.clone()).check_domain(),
            Err(ChurnError::InvalidRange { field: "customer_value", .. })
        ));

        values[9] = 500.0;
        values[3] = 10.0;
        assert!(matches!(
            FeatureVector::from(values.clone()).check_domain(),
            Err(ChurnError::InvalidCategory { field: "billing_level", .. })
        ));

        values[3] = 2.5;
        assert!(FeatureVector::from(values).check_domain().is_err());

        assert!(matches!(
            FeatureVector::from(vec![0.0; 9]).check_domain(),
            Err(ChurnError::ShapeMismatch { expected: 10, actual: 9 })
        ));
    }

    #[test]
    fn test_parse_record() {
        let record = parse_record("0,No,24,Medium,10,20,Contractual,Active,35,500").unwrap();
        assert_eq!(record, sample_record());

        let record = parse_record("3, Yes, 5, VIP, 1, 2, Pay as you go, No Active, 60, 12.5").unwrap();
        assert_eq!(record.plan_type, "Pay as you go");
        assert_eq!(record.customer_value, 12.5);

        assert!(matches!(
            parse_record("0,No,24"),
            Err(ChurnError::InvalidInput(_))
        ));
        assert!(matches!(
            parse_record("x,No,24,Medium,10,20,Contractual,Active,35,500"),
            Err(ChurnError::InvalidInput(_))
        ));
    }
}
