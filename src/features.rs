//! Causal feature construction.
//!
//! The same formulas build features for historical (training) rows and
//! synthetic future (forecasting) rows. Any drift between the two silently
//! breaks the persisted scaler/model contract, so both paths live here.

use crate::data::{AggregatedRecord, LastKnownValues};
use crate::error::{DemandError, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Relative price vs competitor
pub const PRICE_RATIO: &str = "price_ratio";
/// Average discount rate
pub const DISCOUNT: &str = "discount";
/// Holiday/promotion flag
pub const HOLIDAY_FLAG: &str = "holiday_flag";
/// Previous day's holiday flag (pre-holiday demand spike)
pub const HOLIDAY_LAG1: &str = "holiday_lag1";

/// Guards the price ratio against a zero competitor price
pub const PRICE_RATIO_EPSILON: f64 = 1e-6;

/// Every candidate exogenous feature, in scaler order
pub fn candidate_columns() -> Vec<String> {
    vec![
        PRICE_RATIO.to_string(),
        DISCOUNT.to_string(),
        HOLIDAY_FLAG.to_string(),
        HOLIDAY_LAG1.to_string(),
    ]
}

/// An ordered set of named feature columns with one row per day
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        for row in &rows {
            if row.len() != columns.len() {
                return Err(DemandError::FeatureContractMismatch(format!(
                    "row width {} does not match {} columns",
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row-range slice, keeping the column contract
    pub fn slice_rows(&self, start: usize, end: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows[start..end].to_vec(),
        }
    }
}

/// Build the candidate feature matrix over a product's aggregated history,
/// one row per historical day.
///
/// `holiday_lag1` on the first row has no prior day and defaults to 0.
pub fn build_historical_features(rows: &[AggregatedRecord]) -> Result<FeatureMatrix> {
    let mut out = Vec::with_capacity(rows.len());
    let mut prev_holiday = 0.0;

    for r in rows {
        out.push(vec![
            r.price / (r.competitor_price + PRICE_RATIO_EPSILON),
            r.discount,
            r.holiday_flag,
            prev_holiday,
        ]);
        prev_holiday = r.holiday_flag;
    }

    FeatureMatrix::new(candidate_columns(), out)
}

/// A synthesized future day, before feature derivation
#[derive(Debug, Clone, Copy)]
pub struct FutureRow {
    pub date: NaiveDate,
    pub price: f64,
    pub discount: f64,
    pub competitor_price: f64,
    pub holiday_flag: f64,
}

/// What-if perturbation applied to synthetic future rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Drivers held at their trailing 30-day means
    Baseline,
    /// Discount raised by 10 percentage points
    DiscountBoost,
    /// Price multiplied by 0.95
    PriceCut,
    /// Next Saturday and Sunday in the horizon flagged as holidays
    HolidayPromo,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Baseline,
        Scenario::DiscountBoost,
        Scenario::PriceCut,
        Scenario::HolidayPromo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Baseline => "baseline",
            Scenario::DiscountBoost => "discount_boost",
            Scenario::PriceCut => "price_cut",
            Scenario::HolidayPromo => "holiday_promo",
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scenario {
    type Err = DemandError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "baseline" => Ok(Scenario::Baseline),
            "discount_boost" => Ok(Scenario::DiscountBoost),
            "price_cut" => Ok(Scenario::PriceCut),
            "holiday_promo" => Ok(Scenario::HolidayPromo),
            other => Err(DemandError::InvalidParameter(format!(
                "unknown scenario '{}'",
                other
            ))),
        }
    }
}

/// Synthesize `horizon` future daily rows seeded from trailing 30-day means,
/// then apply the scenario perturbation.
pub fn synthesize_future_rows(
    last: &LastKnownValues,
    horizon: usize,
    scenario: Scenario,
) -> Vec<FutureRow> {
    let mut rows = Vec::with_capacity(horizon);
    let mut saturday_seen = false;
    let mut sunday_seen = false;

    for i in 0..horizon {
        let date = last.last_date + Duration::days(i as i64 + 1);
        let mut row = FutureRow {
            date,
            price: last.avg_price_30d,
            discount: last.avg_discount_30d,
            competitor_price: last.avg_competitor_30d,
            holiday_flag: 0.0,
        };

        match scenario {
            Scenario::Baseline => {}
            Scenario::DiscountBoost => row.discount += 10.0,
            Scenario::PriceCut => row.price *= 0.95,
            Scenario::HolidayPromo => match date.weekday() {
                Weekday::Sat if !saturday_seen => {
                    row.holiday_flag = 1.0;
                    saturday_seen = true;
                }
                Weekday::Sun if !sunday_seen => {
                    row.holiday_flag = 1.0;
                    sunday_seen = true;
                }
                _ => {}
            },
        }

        rows.push(row);
    }

    rows
}

/// Derive the candidate feature matrix for synthetic future rows.
///
/// The first future day has no prior synthetic row, so its lag seeds from
/// the last known historical holiday flag.
pub fn build_future_features(rows: &[FutureRow], last_holiday: f64) -> Result<FeatureMatrix> {
    let mut out = Vec::with_capacity(rows.len());
    let mut prev_holiday = last_holiday;

    for r in rows {
        out.push(vec![
            r.price / (r.competitor_price + PRICE_RATIO_EPSILON),
            r.discount,
            r.holiday_flag,
            prev_holiday,
        ]);
        prev_holiday = r.holiday_flag;
    }

    FeatureMatrix::new(candidate_columns(), out)
}
