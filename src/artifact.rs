//! Persisted per-product model artifacts.
//!
//! One JSON record per product, written once per training run via a
//! temp-file-and-rename so a concurrent reader never observes a partially
//! written artifact. Older artifacts carried a single `exog_columns` list
//! instead of the full/active pair; those load with every column treated
//! as active.

use crate::error::{DemandError, Result};
use crate::models::TrainedCausalModel;
use crate::scaler::StandardScaler;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Business-facing names for the causal coefficients
pub const PRICE_SENSITIVITY: &str = "Price_Sensitivity";
pub const DISCOUNT_EFFECT: &str = "Discount_Effect";
pub const HOLIDAY_EFFECT: &str = "Holiday_Effect";
pub const BASE_TREND: &str = "Base_Trend";

/// Signed per-driver coefficients mapped to business terms.
///
/// A missing term means the feature was not in the active set (removed by
/// the guardrail, or never a candidate).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CausalInsights {
    #[serde(rename = "Price_Sensitivity", skip_serializing_if = "Option::is_none")]
    pub price_sensitivity: Option<f64>,
    #[serde(rename = "Discount_Effect", skip_serializing_if = "Option::is_none")]
    pub discount_effect: Option<f64>,
    #[serde(rename = "Holiday_Effect", skip_serializing_if = "Option::is_none")]
    pub holiday_effect: Option<f64>,
    #[serde(rename = "Base_Trend", default)]
    pub base_trend: f64,
}

impl CausalInsights {
    /// The causal term with the largest absolute coefficient, or
    /// "Trend/Seasonality" when no causal coefficients are available.
    pub fn main_driver(&self) -> String {
        let candidates = [
            (PRICE_SENSITIVITY, self.price_sensitivity),
            (DISCOUNT_EFFECT, self.discount_effect),
            (HOLIDAY_EFFECT, self.holiday_effect),
        ];
        candidates
            .iter()
            .filter_map(|(name, coef)| coef.map(|c| (*name, c.abs())))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| "Trend/Seasonality".to_string())
    }
}

/// Everything the forecaster needs to replay training-time decisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model: TrainedCausalModel,
    pub scaler: StandardScaler,
    pub model_type: String,
    pub confidence: f64,
    pub wmape: f64,
    pub avg_daily_demand: f64,
    pub last_date: NaiveDate,
    pub causal_insights: CausalInsights,
    pub main_driver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    all_feature_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    active_feature_columns: Option<Vec<String>>,
    /// Legacy single-column-list field; still written for older readers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exog_columns: Option<Vec<String>>,
    pub product_id: String,
    #[serde(default)]
    pub guardrail_triggered: bool,
}

impl ModelArtifact {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        product_id: String,
        model: TrainedCausalModel,
        scaler: StandardScaler,
        confidence: f64,
        wmape: f64,
        avg_daily_demand: f64,
        last_date: NaiveDate,
        causal_insights: CausalInsights,
        all_columns: Vec<String>,
        active_columns: Vec<String>,
        guardrail_triggered: bool,
    ) -> Result<Self> {
        for col in &active_columns {
            if !all_columns.contains(col) {
                return Err(DemandError::FeatureContractMismatch(format!(
                    "active column '{}' not in full column list",
                    col
                )));
            }
        }
        let main_driver = causal_insights.main_driver();
        Ok(Self {
            model,
            scaler,
            model_type: "causal_product_level".to_string(),
            confidence,
            wmape,
            avg_daily_demand,
            last_date,
            causal_insights,
            main_driver,
            exog_columns: Some(all_columns.clone()),
            all_feature_columns: Some(all_columns),
            active_feature_columns: Some(active_columns),
            product_id,
            guardrail_triggered,
        })
    }

    /// Every candidate column the scaler was fitted on, in order
    pub fn all_columns(&self) -> Result<&[String]> {
        self.all_feature_columns
            .as_deref()
            .or(self.exog_columns.as_deref())
            .ok_or_else(|| {
                DemandError::FeatureContractMismatch(format!(
                    "artifact for '{}' carries no feature column list",
                    self.product_id
                ))
            })
    }

    /// Columns actually used by the fitted model; legacy artifacts treat
    /// every column as active.
    pub fn active_columns(&self) -> Result<&[String]> {
        match &self.active_feature_columns {
            Some(cols) => Ok(cols),
            None => self.all_columns(),
        }
    }

    /// Whether the price-ratio driver survived training
    pub fn price_feature_active(&self) -> bool {
        self.active_columns()
            .map(|cols| cols.iter().any(|c| c == crate::features::PRICE_RATIO))
            .unwrap_or(false)
    }
}

/// Directory-backed artifact store, one JSON file per product
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

const ARTIFACT_SUFFIX: &str = "_aggregated_model.json";

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, product_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", product_id, ARTIFACT_SUFFIX))
    }

    /// Atomic replace: write to a sibling temp file, then rename over the
    /// final path.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<()> {
        let path = self.path_for(&artifact.product_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(artifact)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn load(&self, product_id: &str) -> Result<ModelArtifact> {
        let path = self.path_for(product_id);
        if !path.exists() {
            return Err(DemandError::ModelNotFound(product_id.to_string()));
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Product ids with a persisted artifact, sorted
    pub fn product_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if let Some(stem) = name.strip_suffix(ARTIFACT_SUFFIX) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features;
    use crate::features::FeatureMatrix;
    use crate::models::CausalDemandModel;
    use chrono::Duration;

    fn fitted_model() -> (TrainedCausalModel, StandardScaler) {
        let start: NaiveDate = "2023-01-01".parse().unwrap();
        let dates: Vec<NaiveDate> = (0..60).map(|i| start + Duration::days(i)).collect();
        let demand = vec![100.0; 60];
        let exog: Vec<Vec<f64>> = (0..60).map(|i| vec![(i % 3) as f64, 0.0, 0.0, 0.0]).collect();
        let matrix = FeatureMatrix::new(features::candidate_columns(), exog.clone()).unwrap();
        let scaler = StandardScaler::fit(&matrix).unwrap();
        let scaled = scaler.transform(&matrix).unwrap();
        let model = CausalDemandModel::new()
            .fit(&dates, &demand, scaled.rows())
            .unwrap();
        (model, scaler)
    }

    fn sample_artifact() -> ModelArtifact {
        let (model, scaler) = fitted_model();
        ModelArtifact::new(
            "P001".to_string(),
            model,
            scaler,
            0.9,
            0.1,
            100.0,
            "2023-03-01".parse().unwrap(),
            CausalInsights {
                price_sensitivity: Some(-1.2),
                discount_effect: Some(0.4),
                holiday_effect: None,
                base_trend: 0.01,
            },
            features::candidate_columns(),
            features::candidate_columns(),
            false,
        )
        .unwrap()
    }

    #[test]
    fn active_outside_full_set_is_rejected() {
        let (model, scaler) = fitted_model();
        let err = ModelArtifact::new(
            "P001".to_string(),
            model,
            scaler,
            0.9,
            0.1,
            100.0,
            "2023-03-01".parse().unwrap(),
            CausalInsights::default(),
            features::candidate_columns(),
            vec!["ghost".to_string()],
            false,
        )
        .unwrap_err();
        assert!(matches!(err, DemandError::FeatureContractMismatch(_)));
    }

    #[test]
    fn main_driver_picks_largest_absolute_coefficient() {
        let insights = CausalInsights {
            price_sensitivity: Some(-3.0),
            discount_effect: Some(1.0),
            holiday_effect: Some(2.0),
            base_trend: 10.0,
        };
        assert_eq!(insights.main_driver(), PRICE_SENSITIVITY);

        let empty = CausalInsights {
            base_trend: 5.0,
            ..Default::default()
        };
        assert_eq!(empty.main_driver(), "Trend/Seasonality");
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let artifact = sample_artifact();

        store.save(&artifact).unwrap();
        let loaded = store.load("P001").unwrap();
        assert_eq!(loaded, artifact);
        assert_eq!(store.product_ids().unwrap(), vec!["P001".to_string()]);
    }

    #[test]
    fn missing_artifact_is_model_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.load("P404"),
            Err(DemandError::ModelNotFound(_))
        ));
    }

    #[test]
    fn legacy_single_list_artifact_treats_all_columns_active() {
        let mut value = serde_json::to_value(sample_artifact()).unwrap();
        let obj = value.as_object_mut().unwrap();
        obj.remove("all_feature_columns");
        obj.remove("active_feature_columns");

        let legacy: ModelArtifact = serde_json::from_value(value).unwrap();
        assert_eq!(
            legacy.all_columns().unwrap(),
            features::candidate_columns().as_slice()
        );
        assert_eq!(
            legacy.active_columns().unwrap(),
            features::candidate_columns().as_slice()
        );
        assert!(legacy.price_feature_active());
    }
}
