//! Error types for the forecasting pipeline

use thiserror::Error;

/// Errors raised by any stage of the forecasting pipeline
#[derive(Error, Debug)]
pub enum ForecastError {
    /// Fewer bars than the longest indicator lookback
    #[error("insufficient history: need at least {required} bars, got {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("empty input: {0}")]
    EmptyInput(String),

    #[error("scaler has not been fitted")]
    NotFitted,

    /// Column count or order differs between fit time and use time
    #[error("schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    /// Not enough normalized rows to form a lookback window
    #[error("insufficient rows: lookback {lookback} needs more rows, got {rows}")]
    InsufficientRows { lookback: usize, rows: usize },

    #[error("data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("no trained model for key '{0}'")]
    ModelNotTrained(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid artifact key: {0:?}")]
    InvalidKey(String),

    #[error("artifact corrupted: {0}")]
    ArtifactCorrupted(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ForecastError {
    /// Shorthand for a column-count mismatch
    pub fn width_mismatch(expected: usize, found: usize) -> Self {
        ForecastError::SchemaMismatch {
            expected: format!("{} columns", expected),
            found: format!("{} columns", found),
        }
    }
}

impl From<config::ConfigError> for ForecastError {
    fn from(e: config::ConfigError) -> Self {
        ForecastError::Config(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ForecastError {
    fn from(e: tokio::task::JoinError) -> Self {
        ForecastError::Internal(format!("background task failed: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
