//! Forecasting models for daily demand series.
//!
//! [`causal::CausalDemandModel`] is the trainer's model: trend plus weekly
//! seasonality plus exogenous causal drivers, with per-driver coefficients
//! the guardrail and the insight extraction read back out.
//! [`exponential_smoothing::ExponentialSmoothing`] is the simpler smoothing
//! tier the reorder-point cascade falls back to.

pub mod causal;
pub mod exponential_smoothing;

pub use causal::{CausalDemandModel, TrainedCausalModel};
pub use exponential_smoothing::{ExponentialSmoothing, TrainedExponentialSmoothing};
