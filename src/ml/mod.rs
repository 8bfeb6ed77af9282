//! Forecasting pipeline stages
//!
//! - Feature engineering from daily bars
//! - Min-max scaling with a column schema guard
//! - Lookback window construction
//! - Stacked LSTM forecaster with autoregressive rollout
//! - Error metrics for evaluation

pub mod features;
pub mod forecaster;
pub mod metrics;
pub mod scaler;
pub mod window;


pub use features::{
    engineer_features, to_matrix, FeatureRow, FEATURE_COLUMNS, FEATURE_COUNT,
    MIN_BARS, TARGET_COLUMN,
};
pub use forecaster::{denormalize_predictions, Forecaster, ForecasterConfig, TrainingReport};
pub use scaler::MinMaxScaler;
pub use window::{build_windows, last_window, Window, WindowSet, DEFAULT_LOOKBACK};
