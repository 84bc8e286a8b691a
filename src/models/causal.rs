//! Demand model with trend, weekly seasonality and exogenous causal drivers.
//!
//! Least-squares over a design matrix of intercept, linear trend, weekday
//! dummies and the (already standardized) exogenous columns. The fitted
//! exogenous coefficients are signed demand effects per standardized unit
//! of each driver, which is exactly what the guardrail check and the causal
//! insight extraction consume.

use crate::error::{DemandError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Weekday dummy count: Monday through Saturday, Sunday as baseline
const SEASONAL_TERMS: usize = 6;

/// Untrained model configuration
#[derive(Debug, Clone)]
pub struct CausalDemandModel {
    /// Small L2 term on non-intercept coefficients so degenerate
    /// (constant or collinear) columns keep the system solvable
    ridge: f64,
}

impl Default for CausalDemandModel {
    fn default() -> Self {
        Self { ridge: 1e-6 }
    }
}

impl CausalDemandModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit on a contiguous daily series. `exog` rows align with `dates`;
    /// zero-width rows fit a pure trend/seasonality model.
    pub fn fit(
        &self,
        dates: &[NaiveDate],
        demand: &[f64],
        exog: &[Vec<f64>],
    ) -> Result<TrainedCausalModel> {
        if dates.len() != demand.len() || (!exog.is_empty() && exog.len() != demand.len()) {
            return Err(DemandError::FitFailure(format!(
                "misaligned inputs: {} dates, {} observations, {} exog rows",
                dates.len(),
                demand.len(),
                exog.len()
            )));
        }
        if demand.is_empty() {
            return Err(DemandError::InsufficientHistory { needed: 1, got: 0 });
        }

        let exog_width = exog.first().map_or(0, |r| r.len());
        let p = 2 + SEASONAL_TERMS + exog_width;
        if demand.len() < p {
            return Err(DemandError::InsufficientHistory {
                needed: p,
                got: demand.len(),
            });
        }

        let start_date = dates[0];
        let design: Vec<Vec<f64>> = dates
            .iter()
            .enumerate()
            .map(|(i, date)| {
                design_row(
                    start_date,
                    *date,
                    exog.get(i).map(|r| r.as_slice()).unwrap_or(&[]),
                )
            })
            .collect();

        let coefs = solve_normal_equations(&design, demand, self.ridge)?;
        let fitted: Vec<f64> = design
            .iter()
            .map(|row| row.iter().zip(&coefs).map(|(x, b)| x * b).sum())
            .collect();

        Ok(TrainedCausalModel {
            start_date,
            intercept: coefs[0],
            trend: coefs[1],
            seasonal: coefs[2..2 + SEASONAL_TERMS].to_vec(),
            exog_coefs: coefs[2 + SEASONAL_TERMS..].to_vec(),
            fitted,
        })
    }
}

/// Fitted model; serialized whole into the model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedCausalModel {
    start_date: NaiveDate,
    intercept: f64,
    trend: f64,
    seasonal: Vec<f64>,
    exog_coefs: Vec<f64>,
    fitted: Vec<f64>,
}

impl TrainedCausalModel {
    /// Point forecast for the given future dates. Trend continues by days
    /// since the training start date, so forecasts stay calendar-consistent
    /// no matter how far past the training window they begin.
    pub fn forecast(&self, dates: &[NaiveDate], exog: &[Vec<f64>]) -> Result<Vec<f64>> {
        if !exog.is_empty() && exog.len() != dates.len() {
            return Err(DemandError::FitFailure(format!(
                "{} exog rows for {} forecast dates",
                exog.len(),
                dates.len()
            )));
        }

        dates
            .iter()
            .enumerate()
            .map(|(i, date)| {
                let row = exog.get(i).map(|r| r.as_slice()).unwrap_or(&[]);
                if row.len() != self.exog_coefs.len() {
                    return Err(DemandError::FeatureContractMismatch(format!(
                        "model fitted with {} exog columns, given {}",
                        self.exog_coefs.len(),
                        row.len()
                    )));
                }
                let mut value = self.intercept
                    + self.trend * days_since(self.start_date, *date)
                    + self.seasonal_term(*date);
                for (x, b) in row.iter().zip(&self.exog_coefs) {
                    value += x * b;
                }
                Ok(value)
            })
            .collect()
    }

    /// In-sample fitted values, used for accuracy estimation
    pub fn fitted_values(&self) -> &[f64] {
        &self.fitted
    }

    /// Signed coefficients of the exogenous columns, in fit order
    pub fn exog_coefs(&self) -> &[f64] {
        &self.exog_coefs
    }

    /// Linear trend coefficient (units per day)
    pub fn trend_coef(&self) -> f64 {
        self.trend
    }

    fn seasonal_term(&self, date: NaiveDate) -> f64 {
        let idx = date.weekday().num_days_from_monday() as usize;
        if idx < SEASONAL_TERMS {
            self.seasonal[idx]
        } else {
            0.0
        }
    }
}

fn days_since(start: NaiveDate, date: NaiveDate) -> f64 {
    (date - start).num_days() as f64
}

fn design_row(start: NaiveDate, date: NaiveDate, exog: &[f64]) -> Vec<f64> {
    let mut row = Vec::with_capacity(2 + SEASONAL_TERMS + exog.len());
    row.push(1.0);
    row.push(days_since(start, date));
    let dow = date.weekday().num_days_from_monday() as usize;
    for i in 0..SEASONAL_TERMS {
        row.push(if dow == i { 1.0 } else { 0.0 });
    }
    row.extend_from_slice(exog);
    row
}

/// Solve (X'X + ridge·I) β = X'y by Gaussian elimination with partial
/// pivoting. The intercept is left unpenalized.
fn solve_normal_equations(design: &[Vec<f64>], y: &[f64], ridge: f64) -> Result<Vec<f64>> {
    let p = design[0].len();
    let mut xtx = vec![vec![0.0; p]; p];
    let mut xty = vec![0.0; p];

    for (row, &target) in design.iter().zip(y) {
        for i in 0..p {
            xty[i] += row[i] * target;
            for j in 0..p {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 1..p {
        xtx[i][i] += ridge;
    }

    // Forward elimination
    for col in 0..p {
        let pivot_row = (col..p)
            .max_by(|&a, &b| xtx[a][col].abs().total_cmp(&xtx[b][col].abs()))
            .unwrap_or(col);
        if xtx[pivot_row][col].abs() < 1e-12 {
            return Err(DemandError::FitFailure(
                "singular normal equations; series carries no usable signal".to_string(),
            ));
        }
        xtx.swap(col, pivot_row);
        xty.swap(col, pivot_row);

        for row in col + 1..p {
            let factor = xtx[row][col] / xtx[col][col];
            for k in col..p {
                xtx[row][k] -= factor * xtx[col][k];
            }
            xty[row] -= factor * xty[col];
        }
    }

    // Back substitution
    let mut coefs = vec![0.0; p];
    for row in (0..p).rev() {
        let mut value = xty[row];
        for k in row + 1..p {
            value -= xtx[row][k] * coefs[k];
        }
        coefs[row] = value / xtx[row][row];
    }

    Ok(coefs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn daily_dates(start: &str, n: usize) -> Vec<NaiveDate> {
        let start: NaiveDate = start.parse().unwrap();
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    #[test]
    fn constant_series_forecasts_flat() {
        let dates = daily_dates("2023-01-01", 60);
        let demand = vec![100.0; 60];
        let trained = CausalDemandModel::new().fit(&dates, &demand, &[]).unwrap();

        let future = daily_dates("2023-03-02", 10);
        let forecast = trained.forecast(&future, &[]).unwrap();
        for v in forecast {
            assert_relative_eq!(v, 100.0, max_relative = 0.01);
        }
        assert!(trained.trend_coef().abs() < 0.05);
    }

    #[test]
    fn recovers_a_linear_trend() {
        let dates = daily_dates("2023-01-01", 70);
        let demand: Vec<f64> = (0..70).map(|i| 50.0 + 2.0 * i as f64).collect();
        let trained = CausalDemandModel::new().fit(&dates, &demand, &[]).unwrap();
        assert_relative_eq!(trained.trend_coef(), 2.0, max_relative = 0.01);
    }

    #[test]
    fn recovers_weekly_seasonality() {
        let dates = daily_dates("2023-01-02", 70); // Monday start
        let demand: Vec<f64> = dates
            .iter()
            .map(|d| {
                if d.weekday() == chrono::Weekday::Sat {
                    150.0
                } else {
                    100.0
                }
            })
            .collect();
        let trained = CausalDemandModel::new().fit(&dates, &demand, &[]).unwrap();

        let future = daily_dates("2023-03-13", 7); // Monday..Sunday
        let forecast = trained.forecast(&future, &[]).unwrap();
        let saturday = forecast[5];
        let monday = forecast[0];
        assert!(saturday - monday > 40.0);
    }

    #[test]
    fn recovers_exogenous_coefficient_sign() {
        let dates = daily_dates("2023-01-01", 80);
        // Demand rises 5 units per standardized unit of the driver
        let exog: Vec<Vec<f64>> = (0..80).map(|i| vec![((i % 10) as f64 - 4.5) / 3.0]).collect();
        let demand: Vec<f64> = exog.iter().map(|r| 100.0 + 5.0 * r[0]).collect();

        let trained = CausalDemandModel::new().fit(&dates, &demand, &exog).unwrap();
        assert_relative_eq!(trained.exog_coefs()[0], 5.0, max_relative = 0.05);
    }

    #[test]
    fn forecast_rejects_wrong_exog_width() {
        let dates = daily_dates("2023-01-01", 60);
        let demand = vec![10.0; 60];
        let exog: Vec<Vec<f64>> = (0..60).map(|i| vec![(i % 5) as f64]).collect();
        let trained = CausalDemandModel::new().fit(&dates, &demand, &exog).unwrap();

        let future = daily_dates("2023-03-02", 3);
        let bad = vec![vec![1.0, 2.0]; 3];
        assert!(matches!(
            trained.forecast(&future, &bad),
            Err(DemandError::FeatureContractMismatch(_))
        ));
    }

    #[test]
    fn too_short_series_is_insufficient_history() {
        let dates = daily_dates("2023-01-01", 5);
        let demand = vec![10.0; 5];
        assert!(matches!(
            CausalDemandModel::new().fit(&dates, &demand, &[]),
            Err(DemandError::InsufficientHistory { .. })
        ));
    }
}
