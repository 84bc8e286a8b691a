//! Per-product model training with economic guardrails.
//!
//! The trainer fits one causal demand model per product. A fitted positive
//! price elasticity means price rises correlate with demand rises, which in
//! this domain signals reverse causality (promotional timing confounds)
//! rather than a real effect, so the guardrail removes the price driver and
//! retrains once before accepting the model.

use crate::artifact::{ArtifactStore, CausalInsights, ModelArtifact};
use crate::data::{AggregatedData, ProductHistory};
use crate::error::{DemandError, Result};
use crate::features;
use crate::metrics;
use crate::models::{CausalDemandModel, TrainedCausalModel};
use crate::scaler::{ScaledMatrix, StandardScaler};
use chrono::NaiveDate;
use tracing::{info, warn};

/// Trainer tuning knobs
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Held-out window at the end of each product's series
    pub validation_days: usize,
    /// Minimum daily rows required to train at all
    pub min_history_days: usize,
    /// Positive-noise tolerance on the price-ratio coefficient
    pub guardrail_tolerance: f64,
    /// Fit attempts: the original, plus one retry after a removal
    pub max_attempts: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            validation_days: 30,
            min_history_days: 60,
            guardrail_tolerance: 0.05,
            max_attempts: 2,
        }
    }
}

/// Terminal state of the guardrail loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardrailState {
    /// Final fit had no illogical price coefficient
    Passed,
    /// A violation remained but no removable feature or attempt was left
    Exhausted,
}

/// Outcome of the bounded retrain loop
#[derive(Debug)]
struct GuardrailOutcome {
    model: TrainedCausalModel,
    active: Vec<String>,
    removed: Vec<String>,
    state: GuardrailState,
}

impl GuardrailOutcome {
    fn triggered(&self) -> bool {
        !self.removed.is_empty()
    }
}

/// Per-product training result. Errors never cross this boundary; the batch
/// driver aggregates outcomes instead of unwinding.
#[derive(Debug)]
pub enum TrainOutcome {
    Trained(Box<ModelArtifact>),
    Skipped { product_id: String, reason: String },
    Failed { product_id: String, cause: DemandError },
}

/// Batch training results plus summary statistics
#[derive(Debug)]
pub struct TrainingSummary {
    pub outcomes: Vec<TrainOutcome>,
}

impl TrainingSummary {
    pub fn trained(&self) -> impl Iterator<Item = &ModelArtifact> {
        self.outcomes.iter().filter_map(|o| match o {
            TrainOutcome::Trained(a) => Some(a.as_ref()),
            _ => None,
        })
    }

    pub fn trained_count(&self) -> usize {
        self.trained().count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TrainOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TrainOutcome::Failed { .. }))
            .count()
    }

    pub fn guardrail_count(&self) -> usize {
        self.trained().filter(|a| a.guardrail_triggered).count()
    }

    pub fn mean_wmape(&self) -> Option<f64> {
        mean(self.trained().map(|a| a.wmape))
    }

    pub fn mean_confidence(&self) -> Option<f64> {
        mean(self.trained().map(|a| a.confidence))
    }

    /// Over products that kept a logical price driver
    pub fn mean_price_sensitivity(&self) -> Option<f64> {
        mean(
            self.trained()
                .filter_map(|a| a.causal_insights.price_sensitivity),
        )
    }

    pub fn mean_discount_effect(&self) -> Option<f64> {
        mean(self.trained().filter_map(|a| a.causal_insights.discount_effect))
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        None
    } else {
        Some(collected.iter().sum::<f64>() / collected.len() as f64)
    }
}

/// Fits and persists one causal demand model per product
#[derive(Debug)]
pub struct Trainer<'a> {
    store: &'a ArtifactStore,
    config: TrainerConfig,
}

impl<'a> Trainer<'a> {
    pub fn new(store: &'a ArtifactStore) -> Self {
        Self {
            store,
            config: TrainerConfig::default(),
        }
    }

    pub fn with_config(store: &'a ArtifactStore, config: TrainerConfig) -> Self {
        Self { store, config }
    }

    /// Train every product in the aggregated dataset. Per-product failures
    /// are recorded, never fatal to the batch.
    pub fn train_all(&self, data: &AggregatedData) -> TrainingSummary {
        let mut outcomes = Vec::with_capacity(data.len());
        for history in data.histories() {
            outcomes.push(self.train_product(history));
        }
        let summary = TrainingSummary { outcomes };

        info!(
            trained = summary.trained_count(),
            skipped = summary.skipped_count(),
            failed = summary.failed_count(),
            guardrails = summary.guardrail_count(),
            "training batch finished"
        );
        if let (Some(wmape), Some(confidence)) =
            (summary.mean_wmape(), summary.mean_confidence())
        {
            info!(
                mean_wmape = format!("{:.3}", wmape),
                mean_confidence = format!("{:.2}", confidence),
                "batch accuracy"
            );
        }

        summary
    }

    /// Train a single product and persist the artifact on success
    pub fn train_product(&self, history: &ProductHistory) -> TrainOutcome {
        let product_id = history.product_id().to_string();

        if history.len() < self.config.min_history_days {
            let reason = format!("insufficient data ({} days)", history.len());
            info!(product = %product_id, %reason, "skipped");
            return TrainOutcome::Skipped { product_id, reason };
        }

        match self.fit_and_validate(history) {
            Ok(artifact) => {
                info!(
                    product = %product_id,
                    wmape = format!("{:.3}", artifact.wmape),
                    confidence = format!("{:.2}", artifact.confidence),
                    features = artifact.active_columns().map(|c| c.len()).unwrap_or(0),
                    driver = %artifact.main_driver,
                    "trained"
                );
                TrainOutcome::Trained(Box::new(artifact))
            }
            Err(DemandError::InsufficientHistory { needed, got }) => {
                let reason = format!("insufficient history ({} of {} rows)", got, needed);
                info!(product = %product_id, %reason, "skipped");
                TrainOutcome::Skipped { product_id, reason }
            }
            Err(cause) => {
                warn!(product = %product_id, error = %cause, "training failed");
                TrainOutcome::Failed { product_id, cause }
            }
        }
    }

    fn fit_and_validate(&self, history: &ProductHistory) -> Result<ModelArtifact> {
        let rows = history.rows();
        let features = features::build_historical_features(rows)?;

        if rows.len() <= self.config.validation_days {
            return Err(DemandError::InsufficientHistory {
                needed: self.config.validation_days + 1,
                got: rows.len(),
            });
        }
        let split = rows.len() - self.config.validation_days;
        let train_features = features.slice_rows(0, split);
        let val_features = features.slice_rows(split, rows.len());

        let dates = history.dates();
        let demand = history.units_sold();
        let (train_dates, val_dates) = dates.split_at(split);
        let (train_demand, val_demand) = demand.split_at(split);

        // The scaler is fitted once on the full candidate set over the
        // training window; every later transform goes through the full set
        // before narrowing to the active subset.
        let scaler = StandardScaler::fit(&train_features)?;
        let scaled_train = scaler.transform(&train_features)?;
        let scaled_val = scaler.transform(&val_features)?;

        let outcome = self.run_guardrail_loop(train_dates, train_demand, &scaled_train)?;
        if outcome.state == GuardrailState::Exhausted {
            warn!(
                product = history.product_id(),
                "guardrail exhausted; accepting model as-is"
            );
        }

        let x_val = scaled_val.select(&outcome.active)?;
        let predicted: Vec<f64> = outcome
            .model
            .forecast(val_dates, &x_val)?
            .into_iter()
            .map(|v| v.max(0.0))
            .collect();
        let wmape = metrics::wmape(val_demand, &predicted);
        let confidence = metrics::confidence_from_wmape(wmape);

        let insights = extract_insights(&outcome.model, &outcome.active);
        let avg_daily_demand = train_demand.iter().sum::<f64>() / train_demand.len() as f64;
        let guardrail_triggered = outcome.triggered();

        let artifact = ModelArtifact::new(
            history.product_id().to_string(),
            outcome.model,
            scaler,
            confidence,
            wmape,
            avg_daily_demand,
            rows.last().map(|r| r.date).unwrap_or(train_dates[0]),
            insights,
            features.columns().to_vec(),
            outcome.active,
            guardrail_triggered,
        )?;
        self.store.save(&artifact)?;
        Ok(artifact)
    }

    /// Bounded retrain loop over an immutable candidate set with an explicit
    /// removed-features accumulator. Only the price-ratio driver is ever
    /// removed; remaining drivers are not re-checked after a removal.
    fn run_guardrail_loop(
        &self,
        dates: &[NaiveDate],
        demand: &[f64],
        scaled: &ScaledMatrix,
    ) -> Result<GuardrailOutcome> {
        let candidates: Vec<String> = scaled.columns().to_vec();
        let mut active = candidates.clone();
        let mut removed = Vec::new();

        for attempt in 1..=self.config.max_attempts {
            let x_train = scaled.select(&active)?;
            let model = CausalDemandModel::new().fit(dates, demand, &x_train)?;

            let violation = active
                .iter()
                .position(|c| c == features::PRICE_RATIO)
                .map(|idx| (idx, model.exog_coefs()[idx]))
                .filter(|(_, coef)| *coef > self.config.guardrail_tolerance);

            match violation {
                None => {
                    return Ok(GuardrailOutcome {
                        model,
                        active,
                        removed,
                        state: GuardrailState::Passed,
                    });
                }
                Some((idx, coef)) if attempt < self.config.max_attempts => {
                    warn!(
                        coefficient = format!("{:+.3}", coef),
                        "price coefficient is illogical (reverse causality); removing price driver"
                    );
                    removed.push(active.remove(idx));
                }
                Some((_, _)) => {
                    return Ok(GuardrailOutcome {
                        model,
                        active,
                        removed,
                        state: GuardrailState::Exhausted,
                    });
                }
            }
        }

        // max_attempts >= 1 guarantees a return above
        Err(DemandError::FitFailure(
            "guardrail loop made no fit attempts".to_string(),
        ))
    }
}

/// Map the active columns' fitted coefficients to business terms. The lagged
/// holiday feature has no business term of its own; the trend coefficient
/// becomes the base trend.
fn extract_insights(model: &TrainedCausalModel, active: &[String]) -> CausalInsights {
    let mut insights = CausalInsights {
        base_trend: model.trend_coef(),
        ..Default::default()
    };

    for (i, column) in active.iter().enumerate() {
        let coef = model.exog_coefs()[i];
        match column.as_str() {
            features::PRICE_RATIO => insights.price_sensitivity = Some(coef),
            features::DISCOUNT => insights.discount_effect = Some(coef),
            features::HOLIDAY_FLAG => insights.holiday_effect = Some(coef),
            _ => {}
        }
    }

    insights
}
