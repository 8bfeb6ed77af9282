//! Configuration loading
//!
//! Settings come from an optional TOML file layered with
//! `STOCKCAST__SECTION__FIELD` environment overrides (after `.env` is read).

use crate::data::HistoryRange;
use crate::error::{ForecastError, Result};
use crate::ml::ForecasterConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

/// Price data source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff, doubled on every retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; stockcast/0.1)".to_string()
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            user_agent: default_user_agent(),
        }
    }
}

/// Forecaster architecture and training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Window length in trading days
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    #[serde(default = "default_lstm_units")]
    pub encoder_units: usize,
    #[serde(default = "default_lstm_units")]
    pub decoder_units: usize,
    #[serde(default = "default_dense_units")]
    pub dense_units: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Epochs without improvement before stopping
    #[serde(default = "default_patience")]
    pub patience: usize,
}

fn default_lookback() -> usize {
    60
}
fn default_lstm_units() -> usize {
    50
}
fn default_dense_units() -> usize {
    25
}
fn default_learning_rate() -> f64 {
    0.001
}
fn default_batch_size() -> usize {
    32
}
fn default_epochs() -> usize {
    25
}
fn default_patience() -> usize {
    5
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            encoder_units: default_lstm_units(),
            decoder_units: default_lstm_units(),
            dense_units: default_dense_units(),
            learning_rate: default_learning_rate(),
            batch_size: default_batch_size(),
            epochs: default_epochs(),
            patience: default_patience(),
        }
    }
}

impl ModelConfig {
    /// Forecaster settings for a feature matrix of the given width
    pub fn forecaster(&self, input_size: usize, target_column: usize) -> ForecasterConfig {
        ForecasterConfig {
            lookback: self.lookback,
            input_size,
            target_column,
            encoder_units: self.encoder_units,
            decoder_units: self.decoder_units,
            dense_units: self.dense_units,
            learning_rate: self.learning_rate,
            batch_size: self.batch_size,
            epochs: self.epochs,
            patience: self.patience,
        }
    }
}

/// Corpus used by `train`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_training_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_training_range")]
    pub range: String,
}

fn default_training_symbols() -> Vec<String> {
    ["AAPL", "MSFT", "GOOGL", "AMZN", "META", "NVDA"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_training_range() -> String {
    "10y".to_string()
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            symbols: default_training_symbols(),
            range: default_training_range(),
        }
    }
}

/// Serving defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Days to forecast
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    /// History fetched per forecast
    #[serde(default = "default_forecast_range")]
    pub range: String,
    /// Trailing closes returned alongside the forecast
    #[serde(default = "default_history_points")]
    pub history_points: usize,
    /// Artifact key used when the caller gives none
    #[serde(default = "default_artifact_key")]
    pub default_key: String,
}

fn default_horizon() -> usize {
    7
}
fn default_forecast_range() -> String {
    "2y".to_string()
}
fn default_history_points() -> usize {
    720
}
fn default_artifact_key() -> String {
    "global".to_string()
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            range: default_forecast_range(),
            history_points: default_history_points(),
            default_key: default_artifact_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Root directory; `~` and `$VARS` are expanded
    #[serde(default = "default_artifacts_dir")]
    pub dir: String,
}

fn default_artifacts_dir() -> String {
    "~/.stockcast/artifacts".to_string()
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
        }
    }
}

impl ArtifactsConfig {
    pub fn resolved_dir(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.dir)
            .map_err(|e| ForecastError::Config(format!("artifacts.dir: {}", e)))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

impl Config {
    /// Load from a TOML file (optional) plus environment overrides
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("STOCKCAST")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("training.symbols"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let model = &self.model;
        if model.lookback == 0 {
            return Err(ForecastError::Config("model.lookback must be positive".into()));
        }
        if model.encoder_units == 0 || model.decoder_units == 0 || model.dense_units == 0 {
            return Err(ForecastError::Config("model layer sizes must be positive".into()));
        }
        if !(model.learning_rate.is_finite() && model.learning_rate > 0.0) {
            return Err(ForecastError::Config("model.learning_rate must be positive".into()));
        }
        if model.batch_size == 0 || model.epochs == 0 {
            return Err(ForecastError::Config(
                "model.batch_size and model.epochs must be positive".into(),
            ));
        }
        if self.forecast.horizon == 0 {
            return Err(ForecastError::Config("forecast.horizon must be positive".into()));
        }
        if self.data.timeout_secs == 0 {
            return Err(ForecastError::Config("data.timeout_secs must be positive".into()));
        }
        HistoryRange::parse(&self.forecast.range)?;
        HistoryRange::parse(&self.training.range)?;
        Ok(())
    }
}
