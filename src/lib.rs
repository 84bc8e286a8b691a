//! # Demand Insight
//!
//! A Rust library for retail demand forecasting and inventory replenishment.
//!
//! ## Features
//!
//! - Sales data loading with tolerant column detection (CSV via polars)
//! - Store-to-product demand aggregation with gap filling
//! - Causal demand models (trend + weekly seasonality + business drivers)
//! - Guardrailed training that rejects reverse-causality price effects
//! - Scenario forecasting (discounts, price cuts, holiday promotions)
//! - Reorder-point engine with safety stock and priority classification
//!
//! ## Quick Start
//!
//! ```no_run
//! # fn main() -> Result<(), demand_insight::DemandError> {
//! use demand_insight::artifact::ArtifactStore;
//! use demand_insight::data::DataLoader;
//! use demand_insight::forecast::Forecaster;
//! use demand_insight::train::Trainer;
//!
//! // Load, aggregate, and train
//! let data = DataLoader::from_csv("retail_sales.csv")?;
//! let aggregated = data.aggregate();
//! let store = ArtifactStore::new("models")?;
//! let trainer = Trainer::new(&store);
//! let summary = trainer.train_all(&aggregated);
//! println!("trained {} products", summary.trained_count());
//!
//! // Forecast a scenario
//! let forecaster = Forecaster::new(&store, &aggregated);
//! let analysis = forecaster.run_scenario_analysis("P001", 30)?;
//! for impact in &analysis.impacts {
//!     println!("{}: {:+.1}%", impact.scenario, impact.pct_change);
//! }
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod data;
pub mod error;
pub mod features;
pub mod forecast;
pub mod metrics;
pub mod models;
pub mod rop;
pub mod scaler;
pub mod train;

// Re-export commonly used types
pub use crate::artifact::{ArtifactStore, CausalInsights, ModelArtifact};
pub use crate::data::{AggregatedData, DataLoader, Dataset};
pub use crate::error::{DemandError, Result};
pub use crate::features::Scenario;
pub use crate::forecast::Forecaster;
pub use crate::rop::RopEngine;
pub use crate::train::{TrainOutcome, Trainer, TrainerConfig};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
