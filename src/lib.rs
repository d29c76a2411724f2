//! Tabular regression training on candle
//!
//! Trains a regression network over an in-memory table with data-integrity
//! checks, mini-batch Adam updates and patience-based early stopping.
//!
//! # Pipeline
//!
//! - **Validator**: every feature and the target must be numeric and free of
//!   missing, NaN and infinite values
//! - **Evaluator**: inference-mode forward pass reporting MSE, RMSE and R²
//! - **Trainer**: shuffled mini-batch epochs, per-epoch evaluation, early
//!   stopping and restore of the best parameter state
//!
//! # Example
//!
//! ```ignore
//! use candle_core::{DType, Device};
//! use tabular_trainer::{train_model, LinearRegressor, RegressionModel, TrainingConfig};
//!
//! let n_features = x_train.width();
//! let mut model = RegressionModel::new(
//!     move |vb| LinearRegressor::new(n_features, true, vb),
//!     DType::F32,
//!     &Device::Cpu,
//! )?;
//! let state = train_model(&mut model, &x_train, &y_train, &x_val, &y_val, &TrainingConfig::default())?;
//! ```

pub mod config;
pub mod data;
pub mod models;
pub mod training;
pub mod utils;

// Re-export commonly used items
pub use config::{DeviceSelector, TrainingConfig};
pub use models::{LinearRegressor, RegressionModel};
pub use training::{
    evaluate_model, train_model, Checkpoint, ParameterState, RegressionMetrics, Trainer,
    TrainingReport,
};

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("Non-numeric column found: {column} (dtype: {dtype}). Ensure all features and the target are numeric.")]
    DataType { column: String, dtype: String },

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("NaN or Inf detected in loss at epoch {epoch}")]
    NumericalInstability { epoch: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Parameter state error: {0}")]
    State(String),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrainError>;
