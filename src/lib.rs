//! Stock Price Forecasting
//!
//! Forecasts daily closing prices with a stacked LSTM trained on technical
//! indicators.
//!
//! ## Architecture
//!
//! ```text
//! PriceSource (Yahoo) → Features → Scaler → Windows → Forecaster → Forecast
//!                                     ↑                    ↑
//!                          ArtifactStore / ArtifactRegistry (versioned, on disk)
//!                                     ↑
//!                           TrainingService (out of band)
//! ```

pub mod artifacts;
pub mod config;
pub mod data;
pub mod error;
pub mod ml;
pub mod service;
pub mod types;
