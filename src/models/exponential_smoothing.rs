//! Exponential smoothing fallback for demand forecasting

use crate::error::{DemandError, Result};
use serde::{Deserialize, Serialize};

/// Simple exponential smoothing model
#[derive(Debug, Clone)]
pub struct ExponentialSmoothing {
    /// Smoothing parameter
    alpha: f64,
}

impl ExponentialSmoothing {
    /// Create a new exponential smoothing model
    pub fn new(alpha: f64) -> Result<Self> {
        if alpha <= 0.0 || alpha >= 1.0 {
            return Err(DemandError::InvalidParameter(
                "alpha must be between 0 and 1".to_string(),
            ));
        }
        Ok(Self { alpha })
    }

    pub fn fit(&self, demand: &[f64]) -> Result<TrainedExponentialSmoothing> {
        if demand.is_empty() {
            return Err(DemandError::InsufficientHistory { needed: 1, got: 0 });
        }

        // Initialize level with the first observation, then update with the
        // smoothing recursion; each fitted value is the one-step-ahead level.
        let mut level = demand[0];
        let mut fitted = Vec::with_capacity(demand.len());
        fitted.push(level);
        for &value in &demand[1..] {
            fitted.push(level);
            level = self.alpha * value + (1.0 - self.alpha) * level;
        }

        Ok(TrainedExponentialSmoothing {
            alpha: self.alpha,
            level,
            fitted,
        })
    }
}

/// Trained exponential smoothing model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedExponentialSmoothing {
    alpha: f64,
    level: f64,
    fitted: Vec<f64>,
}

impl TrainedExponentialSmoothing {
    /// The forecast is constant at the final smoothed level
    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        vec![self.level; horizon]
    }

    /// One-step-ahead in-sample predictions
    pub fn fitted_values(&self) -> &[f64] {
        &self.fitted
    }

    pub fn level(&self) -> f64 {
        self.level
    }
}
