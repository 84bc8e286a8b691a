//! Error types for the demand_insight crate

use thiserror::Error;

/// Custom error types for the demand_insight crate
#[derive(Debug, Error)]
pub enum DemandError {
    /// Source data is missing or a filtered slice came back empty
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Series is below the minimum row threshold for the requested operation
    #[error("Insufficient history: need {needed} observations, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    /// No persisted artifact for the requested product
    #[error("Model not found for product '{0}'")]
    ModelNotFound(String),

    /// Numerical non-convergence or a library-level fitting error
    #[error("Fit failure: {0}")]
    FitFailure(String),

    /// Active columns not found in the persisted full-column list
    #[error("Feature contract mismatch: {0}")]
    FeatureContractMismatch(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error serializing or deserializing an artifact
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Error writing the forecast export
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, DemandError>;

impl From<polars::prelude::PolarsError> for DemandError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        DemandError::PolarsError(err.to_string())
    }
}
