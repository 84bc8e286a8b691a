//! Reorder-point computation on top of per-SKU demand forecasts.
//!
//! Forecast sourcing is a degradation cascade: a seasonal trend model when
//! enough history exists, exponential smoothing when that fails to fit, a
//! flat historical mean as the last resort. Each lower tier reports lower
//! confidence so degraded trust is surfaced rather than hidden.

use crate::data::{Dataset, SkuHistory};
use crate::error::{DemandError, Result};
use crate::metrics;
use crate::models::{CausalDemandModel, ExponentialSmoothing};
use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use statrs::statistics::Statistics;
use tracing::{debug, info};

pub const DEFAULT_LEAD_TIME_DAYS: u32 = 3;
pub const RECOMMENDED_ORDER_DAYS: usize = 14;
pub const DEFAULT_SERVICE_LEVEL: f64 = 0.95;
pub const FORECAST_HORIZON: usize = 30;

/// Minimum observations before a time-series model is worth fitting
const MIN_TIMESERIES_OBS: usize = 14;
/// Minimum observations for any ROP calculation
const MIN_ROP_OBS: usize = 2;
/// ~85% interval multiplier for forecast bounds
const BOUND_Z: f64 = 1.44;

/// One-tailed normal z-score for a target service level. Unrecognized
/// levels fall back to the 0.95 default.
pub fn z_score(service_level: f64) -> f64 {
    const TABLE: [(f64, f64); 4] = [(0.90, 1.28), (0.95, 1.645), (0.98, 2.05), (0.99, 2.33)];
    TABLE
        .iter()
        .find(|(level, _)| (service_level - level).abs() < 1e-9)
        .map(|(_, z)| *z)
        .unwrap_or(1.645)
}

/// Which tier of the cascade produced a forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Trend + weekly seasonality model over the daily series
    SeasonalTrend,
    /// Smoothing fallback after a seasonal fit failure
    ExponentialSmoothing,
    /// Flat historical mean; too little data for a time-series model
    SimpleAverage,
    /// Flat historical mean after every model tier failed
    FallbackAverage,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            ModelTier::SeasonalTrend => "seasonal_trend",
            ModelTier::ExponentialSmoothing => "exponential_smoothing",
            ModelTier::SimpleAverage => "simple_average",
            ModelTier::FallbackAverage => "fallback_average",
        };
        f.write_str(tag)
    }
}

/// Point forecast with rough bounds for one SKU
#[derive(Debug, Clone)]
pub struct SkuForecast {
    pub values: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub model_used: ModelTier,
    pub confidence: f64,
}

/// Generate a per-SKU demand forecast through the model cascade
pub fn forecast_sku_demand(sku: &SkuHistory, horizon: usize) -> SkuForecast {
    let units = sku.units();

    if sku.len() < MIN_TIMESERIES_OBS {
        return flat_forecast(&units, horizon, ModelTier::SimpleAverage, 0.6);
    }

    let (dates, series) = sku.daily_series();

    match seasonal_forecast(&dates, &series, horizon) {
        Ok(forecast) => forecast,
        Err(e) => {
            debug!(sku = %sku.product_id, error = %e, "seasonal fit failed; trying smoothing");
            match smoothing_forecast(&series, horizon) {
                Ok(forecast) => forecast,
                Err(e) => {
                    debug!(sku = %sku.product_id, error = %e, "smoothing failed; flat fallback");
                    flat_forecast(&units, horizon, ModelTier::FallbackAverage, 0.5)
                }
            }
        }
    }
}

fn seasonal_forecast(dates: &[NaiveDate], series: &[f64], horizon: usize) -> Result<SkuForecast> {
    let trained = CausalDemandModel::new().fit(dates, series, &[])?;

    let last = *dates
        .last()
        .ok_or_else(|| DemandError::DataUnavailable("empty daily series".to_string()))?;
    let future: Vec<NaiveDate> = (1..=horizon as i64).map(|i| last + Duration::days(i)).collect();
    let values: Vec<f64> = trained
        .forecast(&future, &[])?
        .into_iter()
        .map(|v| v.max(0.0))
        .collect();

    // Bounds from the in-sample residual spread
    let residuals: Vec<f64> = series
        .iter()
        .zip(trained.fitted_values())
        .map(|(a, f)| a - f)
        .collect();
    let spread = residuals.iter().population_std_dev();
    let spread = if spread.is_nan() { 0.0 } else { spread };

    let lower = values.iter().map(|v| (v - BOUND_Z * spread).max(0.0)).collect();
    let upper = values.iter().map(|v| v + BOUND_Z * spread).collect();
    let confidence = metrics::in_sample_accuracy(series, trained.fitted_values());

    Ok(SkuForecast {
        values,
        lower,
        upper,
        model_used: ModelTier::SeasonalTrend,
        confidence,
    })
}

fn smoothing_forecast(series: &[f64], horizon: usize) -> Result<SkuForecast> {
    let trained = ExponentialSmoothing::new(0.3)?.fit(series)?;
    let values: Vec<f64> = trained
        .forecast(horizon)
        .into_iter()
        .map(|v| v.max(0.0))
        .collect();

    let spread = series.iter().population_std_dev();
    let spread = if spread.is_nan() { 0.0 } else { spread };
    let lower = values.iter().map(|v| (v - BOUND_Z * spread).max(0.0)).collect();
    let upper = values.iter().map(|v| v + BOUND_Z * spread).collect();

    // A tier below the seasonal model never claims more trust than it
    let confidence = metrics::in_sample_accuracy(series, trained.fitted_values()).min(0.6);

    Ok(SkuForecast {
        values,
        lower,
        upper,
        model_used: ModelTier::ExponentialSmoothing,
        confidence,
    })
}

fn flat_forecast(units: &[f64], horizon: usize, tier: ModelTier, confidence: f64) -> SkuForecast {
    let avg = if units.is_empty() { 0.0 } else { units.iter().mean() };
    let std = units.iter().population_std_dev();
    let std = if std.is_nan() { 0.0 } else { std };

    SkuForecast {
        values: vec![avg.max(0.0); horizon],
        lower: vec![(avg - std).max(0.0); horizon],
        upper: vec![(avg + std).max(0.0); horizon],
        model_used: tier,
        confidence,
    }
}

/// Safety-stock and reorder-point figures for one SKU
#[derive(Debug, Clone, Serialize)]
pub struct RopStats {
    pub avg_daily_demand: f64,
    pub std_dev_daily_demand: f64,
    /// Whole units, rounded up
    pub safety_stock: f64,
    /// Whole units, rounded up
    pub reorder_point: f64,
    pub current_stock: f64,
    /// Whole units, rounded up
    pub recommended_order: f64,
    pub forecast_accuracy: f64,
    pub model_used: ModelTier,
    pub forecasted_demand_7d: f64,
    pub forecasted_demand_14d: f64,
    pub forecasted_demand_30d: f64,
}

/// Compute ROP figures for a SKU from a forecast over lead time plus the
/// recommended order window.
pub fn calculate_rop(sku: &SkuHistory, lead_time: u32, service_level: f64) -> Result<RopStats> {
    if lead_time == 0 {
        return Err(DemandError::InvalidParameter(
            "lead time must be at least one day".to_string(),
        ));
    }
    if sku.len() < MIN_ROP_OBS {
        return Err(DemandError::InsufficientHistory {
            needed: MIN_ROP_OBS,
            got: sku.len(),
        });
    }

    let lead = lead_time as usize;
    let horizon = lead + RECOMMENDED_ORDER_DAYS;
    let forecast = forecast_sku_demand(sku, horizon);

    let avg_daily_demand = forecast.values[..lead].iter().mean();

    // Blend realized volatility with near-term forecast volatility
    let mut combined = sku.units();
    combined.extend_from_slice(&forecast.values[..7.min(forecast.values.len())]);
    let mut std_dev = combined.iter().population_std_dev();
    // Near-zero rather than exact zero: fitted forecasts reproduce constant
    // series only to floating-point precision
    if std_dev.is_nan() || std_dev < 1e-6 {
        // Assume a 20% coefficient of variation
        std_dev = avg_daily_demand * 0.2;
    }

    let z = z_score(service_level);
    let safety_stock = z * std_dev * (lead as f64).sqrt();
    let reorder_point = avg_daily_demand * lead as f64 + safety_stock;

    let order_window = RECOMMENDED_ORDER_DAYS.min(forecast.values.len());
    let recommended_order: f64 = forecast.values[..order_window].iter().sum();

    let sum_to = |days: usize| forecast.values[..days.min(forecast.values.len())].iter().sum();

    Ok(RopStats {
        avg_daily_demand,
        std_dev_daily_demand: std_dev,
        safety_stock: safety_stock.ceil(),
        reorder_point: reorder_point.ceil(),
        current_stock: sku.inventory_level,
        recommended_order: recommended_order.ceil(),
        forecast_accuracy: forecast.confidence,
        model_used: forecast.model_used,
        forecasted_demand_7d: sum_to(7),
        forecasted_demand_14d: sum_to(14),
        forecasted_demand_30d: sum_to(30),
    })
}

/// Urgency of a reorder recommendation, most urgent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Classify against the reorder point; boundaries are inclusive
pub fn classify_priority(current_stock: f64, reorder_point: f64) -> Priority {
    if current_stock <= 0.5 * reorder_point {
        Priority::High
    } else if current_stock <= 0.9 * reorder_point {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// One SKU that needs reordering
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub sku_id: String,
    pub product_id: String,
    pub store_id: String,
    pub current_stock: f64,
    pub reorder_point: f64,
    pub recommended_order: f64,
    pub lead_time_days: u32,
    pub priority: Priority,
    pub estimated_stockout_date: Option<NaiveDate>,
    pub forecast_accuracy: f64,
    pub model_used: ModelTier,
    pub forecasted_demand_7d: f64,
    pub forecasted_demand_14d: f64,
    pub forecasted_demand_30d: f64,
}

/// Dated forecast point with bounds, for the detailed SKU view
#[derive(Debug, Clone, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub forecast: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Detailed forecast with recent historical context
#[derive(Debug, Clone, Serialize)]
pub struct SkuDetail {
    pub product_id: String,
    pub store_id: String,
    /// Last 60 observed days
    pub historical: Vec<(NaiveDate, f64)>,
    pub forecast: Vec<ForecastPoint>,
    pub model_used: ModelTier,
    pub confidence: f64,
}

/// Reorder-point engine over an immutable dataset
#[derive(Debug)]
pub struct RopEngine<'a> {
    data: &'a Dataset,
}

impl<'a> RopEngine<'a> {
    pub fn new(data: &'a Dataset) -> Self {
        Self { data }
    }

    /// ROP figures for a single SKU
    pub fn reorder_point(
        &self,
        product_id: &str,
        store_id: &str,
        lead_time: u32,
        service_level: f64,
    ) -> Result<RopStats> {
        let sku = self.data.sku_history(product_id, store_id)?;
        calculate_rop(&sku, lead_time, service_level)
    }

    /// Reorder recommendations across every SKU, most urgent first.
    /// SKUs above their reorder point are omitted entirely.
    pub fn recommendations(&self, lead_time: u32, service_level: f64) -> Result<Vec<Recommendation>> {
        self.recommendations_as_of(lead_time, service_level, Utc::now().date_naive())
    }

    /// Same as [`Self::recommendations`] with an explicit "today" for
    /// stockout-date estimation.
    pub fn recommendations_as_of(
        &self,
        lead_time: u32,
        service_level: f64,
        today: NaiveDate,
    ) -> Result<Vec<Recommendation>> {
        let mut recommendations = Vec::new();

        for (product_id, store_id) in self.data.sku_ids() {
            let sku = match self.data.sku_history(&product_id, &store_id) {
                Ok(sku) => sku,
                Err(_) => continue,
            };
            let stats = match calculate_rop(&sku, lead_time, service_level) {
                Ok(stats) => stats,
                // Thin SKUs are silently excluded from the batch list
                Err(DemandError::InsufficientHistory { .. }) => continue,
                Err(e) => return Err(e),
            };

            if stats.current_stock >= stats.reorder_point {
                continue;
            }

            let priority = classify_priority(stats.current_stock, stats.reorder_point);
            let estimated_stockout_date = match priority {
                Priority::High | Priority::Medium if stats.avg_daily_demand > 0.0 => {
                    let days = stats.current_stock / stats.avg_daily_demand;
                    Some(today + Duration::days(days as i64))
                }
                _ => None,
            };

            recommendations.push(Recommendation {
                sku_id: format!("{}_{}", product_id, store_id),
                product_id,
                store_id,
                current_stock: stats.current_stock,
                reorder_point: stats.reorder_point,
                recommended_order: stats.recommended_order,
                lead_time_days: lead_time,
                priority,
                estimated_stockout_date,
                forecast_accuracy: stats.forecast_accuracy,
                model_used: stats.model_used,
                forecasted_demand_7d: stats.forecasted_demand_7d,
                forecasted_demand_14d: stats.forecasted_demand_14d,
                forecasted_demand_30d: stats.forecasted_demand_30d,
            });
        }

        recommendations.sort_by_key(|r| r.priority);
        info!(
            recommendations = recommendations.len(),
            lead_time, "reorder recommendations generated"
        );
        Ok(recommendations)
    }

    /// Detailed forecast for one SKU with its recent history
    pub fn detailed_forecast(
        &self,
        product_id: &str,
        store_id: &str,
        horizon: usize,
    ) -> Result<SkuDetail> {
        let sku = self.data.sku_history(product_id, store_id)?;
        let forecast = forecast_sku_demand(&sku, horizon);

        let historical: Vec<(NaiveDate, f64)> = sku
            .observations
            .iter()
            .rev()
            .take(60)
            .rev()
            .cloned()
            .collect();

        let points = (0..horizon)
            .map(|i| ForecastPoint {
                date: sku.last_date + Duration::days(i as i64 + 1),
                forecast: forecast.values[i],
                lower_bound: forecast.lower[i],
                upper_bound: forecast.upper[i],
            })
            .collect();

        Ok(SkuDetail {
            product_id: product_id.to_string(),
            store_id: store_id.to_string(),
            historical,
            forecast: points,
            model_used: forecast.model_used,
            confidence: forecast.confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sku(units: &[f64], inventory: f64) -> SkuHistory {
        let start: NaiveDate = "2023-01-01".parse().unwrap();
        SkuHistory {
            product_id: "P001".to_string(),
            store_id: "S001".to_string(),
            observations: units
                .iter()
                .enumerate()
                .map(|(i, &u)| (start + Duration::days(i as i64), u))
                .collect(),
            inventory_level: inventory,
            last_date: start + Duration::days(units.len() as i64 - 1),
        }
    }

    #[test]
    fn z_scores_match_service_levels() {
        assert_relative_eq!(z_score(0.90), 1.28);
        assert_relative_eq!(z_score(0.95), 1.645);
        assert_relative_eq!(z_score(0.98), 2.05);
        assert_relative_eq!(z_score(0.99), 2.33);
        // Unrecognized levels fall back to the default
        assert_relative_eq!(z_score(0.85), 1.645);
    }

    #[test]
    fn short_history_uses_simple_average() {
        let sku = sku(&[10.0, 12.0, 8.0], 100.0);
        let forecast = forecast_sku_demand(&sku, 10);
        assert_eq!(forecast.model_used, ModelTier::SimpleAverage);
        assert_relative_eq!(forecast.confidence, 0.6);
        assert!(forecast.values.iter().all(|&v| v == forecast.values[0]));
    }

    #[test]
    fn long_history_fits_seasonal_model() {
        let units: Vec<f64> = (0..60).map(|i| 20.0 + (i % 7) as f64).collect();
        let sku = sku(&units, 100.0);
        let forecast = forecast_sku_demand(&sku, 10);
        assert_eq!(forecast.model_used, ModelTier::SeasonalTrend);
        assert!(forecast.values.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn constant_demand_falls_back_to_cv_std() {
        let sku = sku(&[50.0; 30], 500.0);
        let stats = calculate_rop(&sku, 3, 0.95).unwrap();
        assert_relative_eq!(stats.avg_daily_demand, 50.0, max_relative = 0.01);
        // Zero observed spread: 20% CV assumption kicks in
        assert_relative_eq!(
            stats.std_dev_daily_demand,
            stats.avg_daily_demand * 0.2,
            max_relative = 0.01
        );
    }

    #[test]
    fn two_observation_minimum() {
        let sku = sku(&[5.0], 10.0);
        assert!(matches!(
            calculate_rop(&sku, 3, 0.95),
            Err(DemandError::InsufficientHistory { .. })
        ));
    }

    #[test]
    fn reorder_point_monotone_in_lead_time() {
        let units: Vec<f64> = (0..40).map(|i| 30.0 + (i % 5) as f64).collect();
        let sku = sku(&units, 100.0);
        let mut previous = 0.0;
        for lead_time in 1..=10 {
            let stats = calculate_rop(&sku, lead_time, 0.95).unwrap();
            assert!(
                stats.reorder_point >= previous,
                "ROP decreased at lead time {}",
                lead_time
            );
            previous = stats.reorder_point;
        }
    }

    #[test]
    fn priority_boundaries_are_inclusive() {
        assert_eq!(classify_priority(50.0, 100.0), Priority::High);
        assert_eq!(classify_priority(90.0, 100.0), Priority::Medium);
        assert_eq!(classify_priority(90.1, 100.0), Priority::Low);
        assert_eq!(classify_priority(10.0, 100.0), Priority::High);
    }

    #[test]
    fn priorities_sort_most_urgent_first() {
        let mut priorities = vec![Priority::Low, Priority::High, Priority::Medium];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![Priority::High, Priority::Medium, Priority::Low]
        );
    }
}
