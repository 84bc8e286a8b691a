//! Artifact-driven product demand forecasting.
//!
//! The forecaster replays the trainer's feature-selection decisions: the
//! full future feature matrix goes through the artifact's scaler in the
//! original column order, and only then narrows to the active columns by
//! index lookup. Scaling a pre-sliced subset would silently corrupt every
//! forecast, so the scaler API refuses it.

use crate::artifact::{ArtifactStore, CausalInsights, ModelArtifact};
use crate::data::AggregatedData;
use crate::error::{DemandError, Result};
use crate::features::{self, Scenario};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// One forecasted product-day, as exported downstream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRow {
    pub date: NaiveDate,
    pub product_id: String,
    pub predicted_demand: f64,
    pub price: f64,
    pub discount: f64,
    pub scenario: Scenario,
}

/// Full forecast for one product under one scenario
#[derive(Debug, Clone)]
pub struct ProductForecast {
    pub product_id: String,
    pub scenario: Scenario,
    pub rows: Vec<ForecastRow>,
    pub total_forecast: f64,
    pub avg_daily: f64,
    pub confidence: f64,
    pub main_driver: String,
    pub causal_insights: CausalInsights,
    pub active_features: Vec<String>,
    pub recommendation: String,
}

/// A non-baseline scenario's effect on total forecast demand
#[derive(Debug, Clone)]
pub struct ScenarioImpact {
    pub scenario: Scenario,
    pub total_forecast: f64,
    pub delta_units: f64,
    pub pct_change: f64,
    /// Zero change because the scenario's driver was guardrail-removed;
    /// expected, not anomalous
    pub guardrail_neutral: bool,
}

/// Side-by-side comparison of all scenarios for one product
#[derive(Debug, Clone)]
pub struct ScenarioAnalysis {
    pub product_id: String,
    pub baseline_total: f64,
    pub impacts: Vec<ScenarioImpact>,
}

/// Generates forecasts from persisted artifacts and aggregated history
#[derive(Debug)]
pub struct Forecaster<'a> {
    store: &'a ArtifactStore,
    data: &'a AggregatedData,
}

impl<'a> Forecaster<'a> {
    pub fn new(store: &'a ArtifactStore, data: &'a AggregatedData) -> Self {
        Self { store, data }
    }

    /// Forecast one product over the horizon under a scenario
    pub fn forecast_product(
        &self,
        product_id: &str,
        horizon: usize,
        scenario: Scenario,
    ) -> Result<ProductForecast> {
        let artifact = self.store.load(product_id)?;

        let last = self
            .data
            .product(product_id)
            .and_then(|h| h.last_values())
            .ok_or_else(|| {
                DemandError::DataUnavailable(format!(
                    "no historical data for product '{}'",
                    product_id
                ))
            })?;

        let future = features::synthesize_future_rows(&last, horizon, scenario);
        let matrix = features::build_future_features(&future, last.last_holiday)?;

        // Full transform first, then narrow to the active subset.
        let scaled = artifact.scaler.transform(&matrix)?;
        let x_active = scaled.select(artifact.active_columns()?)?;

        let dates: Vec<NaiveDate> = future.iter().map(|r| r.date).collect();
        let predicted: Vec<f64> = artifact
            .model
            .forecast(&dates, &x_active)?
            .into_iter()
            .map(|v| v.max(0.0))
            .collect();

        let rows: Vec<ForecastRow> = future
            .iter()
            .zip(&predicted)
            .map(|(f, &demand)| ForecastRow {
                date: f.date,
                product_id: product_id.to_string(),
                predicted_demand: demand,
                price: f.price,
                discount: f.discount,
                scenario,
            })
            .collect();

        let total_forecast: f64 = predicted.iter().sum();
        let avg_daily = if predicted.is_empty() {
            0.0
        } else {
            total_forecast / predicted.len() as f64
        };
        let recommendation = recommend(&artifact);

        info!(
            product = %product_id,
            %scenario,
            total = format!("{:.0}", total_forecast),
            features_used = artifact.active_columns()?.len(),
            "forecast generated"
        );

        Ok(ProductForecast {
            product_id: product_id.to_string(),
            scenario,
            rows,
            total_forecast,
            avg_daily,
            confidence: artifact.confidence,
            main_driver: artifact.main_driver.clone(),
            causal_insights: artifact.causal_insights.clone(),
            active_features: artifact.active_columns()?.to_vec(),
            recommendation,
        })
    }

    /// Forecast every product with a persisted artifact. Per-product
    /// failures are logged and excluded, never fatal.
    pub fn forecast_all(&self, horizon: usize, scenario: Scenario) -> Result<Vec<ProductForecast>> {
        let products = self.store.product_ids()?;
        let mut forecasts = Vec::with_capacity(products.len());

        for product_id in &products {
            match self.forecast_product(product_id, horizon, scenario) {
                Ok(forecast) => forecasts.push(forecast),
                Err(e) => warn!(product = %product_id, error = %e, "forecast failed"),
            }
        }

        info!(
            forecasted = forecasts.len(),
            requested = products.len(),
            total_units = format!(
                "{:.0}",
                forecasts.iter().map(|f| f.total_forecast).sum::<f64>()
            ),
            "forecast batch finished"
        );

        Ok(forecasts)
    }

    /// Run all four scenarios for a product and compare each against the
    /// baseline total.
    pub fn run_scenario_analysis(
        &self,
        product_id: &str,
        horizon: usize,
    ) -> Result<ScenarioAnalysis> {
        let artifact = self.store.load(product_id)?;
        let price_active = artifact.price_feature_active();

        let baseline = self.forecast_product(product_id, horizon, Scenario::Baseline)?;
        let baseline_total = baseline.total_forecast;

        let mut impacts = Vec::new();
        for scenario in Scenario::ALL {
            if scenario == Scenario::Baseline {
                continue;
            }
            let result = self.forecast_product(product_id, horizon, scenario)?;
            let delta_units = result.total_forecast - baseline_total;
            let pct_change = if baseline_total > 0.0 {
                delta_units / baseline_total * 100.0
            } else {
                0.0
            };
            let guardrail_neutral = scenario == Scenario::PriceCut
                && !price_active
                && delta_units.abs() < 1e-9;
            if guardrail_neutral {
                info!(product = %product_id, %scenario, "no effect; guardrail active");
            }
            impacts.push(ScenarioImpact {
                scenario,
                total_forecast: result.total_forecast,
                delta_units,
                pct_change,
                guardrail_neutral,
            });
        }

        Ok(ScenarioAnalysis {
            product_id: product_id.to_string(),
            baseline_total,
            impacts,
        })
    }

    /// Write the combined forecast export keyed by (date, product)
    pub fn export_csv<P: AsRef<Path>>(
        forecasts: &[ProductForecast],
        path: P,
    ) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref()).map_err(DemandError::from)?;
        for forecast in forecasts {
            for row in &forecast.rows {
                writer.serialize(row)?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

/// Action recommendation from causal insights, first match wins
fn recommend(artifact: &ModelArtifact) -> String {
    let insights = &artifact.causal_insights;
    if !artifact.price_feature_active() {
        return "Fix Data Quality (Price ignored due to anomalies)".to_string();
    }
    if insights.discount_effect.unwrap_or(0.0) > 1.5 {
        return "High Potential: Run aggressive promotion".to_string();
    }
    if insights.holiday_effect.unwrap_or(0.0) > 2.0 {
        return "Stock up for Holidays".to_string();
    }
    if insights.price_sensitivity.unwrap_or(0.0) < -2.0 {
        return "Sensitive: Consider small price reduction".to_string();
    }
    "Maintain current strategy".to_string()
}
