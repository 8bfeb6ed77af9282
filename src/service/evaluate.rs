//! Backtest a stored model against a symbol's history

use super::forecast::normalize_symbol;
use crate::artifacts::store::validate_key;
use crate::artifacts::{ArtifactRegistry, TrainedArtifact};
use crate::data::{HistoryRange, PriceSource};
use crate::error::{ForecastError, Result};
use crate::ml::{
    build_windows, denormalize_predictions, engineer_features, metrics, to_matrix, FEATURE_COLUMNS,
};
use crate::types::PriceBar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// One-step-ahead errors in price units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub symbol: String,
    pub key: String,
    pub version: u32,
    pub samples: usize,
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
}

/// Score every window of `bars` against the close that followed it
pub fn evaluate_bars(symbol: &str, bars: &[PriceBar], artifact: &TrainedArtifact) -> Result<EvaluationReport> {
    artifact.scaler.ensure_columns(&FEATURE_COLUMNS)?;

    let rows = engineer_features(bars)?;
    let scaled = artifact.scaler.transform(&to_matrix(&rows))?;
    let lookback = artifact.lookback();
    let target = artifact.target_column();

    let set = build_windows(&scaled, lookback, target)?;
    let normalized = artifact.forecaster.predict_batch(&set.windows)?;

    // columns scale independently, so any row serves as the carrier
    let carrier = scaled
        .last()
        .ok_or_else(|| ForecastError::EmptyInput("no feature rows".into()))?;
    let predicted = denormalize_predictions(&artifact.scaler, carrier, target, &normalized)?;
    let actual: Vec<f64> = rows[lookback..].iter().map(|r| r.close).collect();

    Ok(EvaluationReport {
        symbol: symbol.to_string(),
        key: artifact.key().to_string(),
        version: artifact.version(),
        samples: actual.len(),
        mae: metrics::mae(&actual, &predicted)?,
        mse: metrics::mse(&actual, &predicted)?,
        rmse: metrics::rmse(&actual, &predicted)?,
    })
}

pub struct EvaluationService {
    source: Arc<dyn PriceSource>,
    registry: Arc<ArtifactRegistry>,
}

impl EvaluationService {
    pub fn new(source: Arc<dyn PriceSource>, registry: Arc<ArtifactRegistry>) -> Self {
        Self { source, registry }
    }

    pub async fn evaluate(&self, symbol: &str, key: &str, range: &HistoryRange) -> Result<EvaluationReport> {
        let symbol = normalize_symbol(symbol)?;
        validate_key(key)?;

        let registry = self.registry.clone();
        let owned_key = key.to_string();
        let artifact = tokio::task::spawn_blocking(move || registry.get(&owned_key)).await??;

        let bars = self.source.fetch_bars(&symbol, range).await?;
        let report =
            tokio::task::spawn_blocking(move || evaluate_bars(&symbol, &bars, &artifact)).await??;

        info!(
            "Evaluated {} with {} v{:04}: {} samples, MAE {:.4}, RMSE {:.4}",
            report.symbol, report.key, report.version, report.samples, report.mae, report.rmse
        );
        Ok(report)
    }
}
