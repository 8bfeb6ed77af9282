//! Out-of-band model training
//!
//! A training job fetches every symbol in its corpus, fits one scaler over
//! all feature rows, trains the forecaster on per-symbol windows and
//! publishes the result as a new artifact version.

use super::forecast::normalize_symbol;
use crate::artifacts::store::validate_key;
use crate::artifacts::{ArtifactManifest, ArtifactRegistry, SkippedSymbol, TrainedArtifact};
use crate::config::ModelConfig;
use crate::data::{HistoryRange, PriceSource};
use crate::error::{ForecastError, Result};
use crate::ml::{
    build_windows, engineer_features, to_matrix, FeatureRow, Forecaster, MinMaxScaler, WindowSet,
    FEATURE_COLUMNS, FEATURE_COUNT, TARGET_COLUMN,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// What to train and where to publish it
#[derive(Debug, Clone)]
pub struct TrainingJob {
    pub key: String,
    pub symbols: Vec<String>,
    pub range: HistoryRange,
}

pub struct TrainingService {
    source: Arc<dyn PriceSource>,
    registry: Arc<ArtifactRegistry>,
    model: ModelConfig,
}

impl TrainingService {
    pub fn new(
        source: Arc<dyn PriceSource>,
        registry: Arc<ArtifactRegistry>,
        model: ModelConfig,
    ) -> Self {
        Self {
            source,
            registry,
            model,
        }
    }

    /// Run a job in the background
    pub fn spawn(self: &Arc<Self>, job: TrainingJob) -> JoinHandle<Result<Arc<TrainedArtifact>>> {
        let service = self.clone();
        tokio::spawn(async move { service.run(job).await })
    }

    pub async fn run(&self, job: TrainingJob) -> Result<Arc<TrainedArtifact>> {
        validate_key(&job.key)?;
        if job.symbols.is_empty() {
            return Err(ForecastError::EmptyInput("no training symbols".into()));
        }

        info!(
            "Training '{}' on {} symbols ({})",
            job.key,
            job.symbols.len(),
            job.range
        );

        let mut series = Vec::new();
        let mut skipped = Vec::new();

        for raw in &job.symbols {
            let symbol = match normalize_symbol(raw) {
                Ok(symbol) => symbol,
                Err(e) => {
                    warn!("Skipping {:?}: {}", raw, e);
                    skipped.push(SkippedSymbol {
                        symbol: raw.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let rows = match self.source.fetch_bars(&symbol, &job.range).await {
                Ok(bars) => engineer_features(&bars),
                Err(e) => Err(e),
            };

            match rows {
                Ok(rows) => series.push((symbol, rows)),
                Err(e) => {
                    warn!("Skipping {}: {}", symbol, e);
                    skipped.push(SkippedSymbol {
                        symbol,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if series.is_empty() {
            return Err(ForecastError::EmptyInput(format!(
                "none of {} symbols produced training data",
                job.symbols.len()
            )));
        }

        let model = self.model.clone();
        let registry = self.registry.clone();
        let key = job.key;

        tokio::task::spawn_blocking(move || {
            let artifact = fit_artifact(&key, series, skipped, &model)?;
            registry.publish(artifact)
        })
        .await?
    }
}

/// Fit scaler and forecaster on per-symbol feature rows
///
/// The scaler sees every symbol's rows; windows are built per symbol so none
/// spans two tickers. Symbols too short to form a window are recorded as
/// skipped.
pub fn fit_artifact(
    key: &str,
    series: Vec<(String, Vec<FeatureRow>)>,
    mut skipped: Vec<SkippedSymbol>,
    model: &ModelConfig,
) -> Result<TrainedArtifact> {
    let matrices: Vec<(String, Vec<Vec<f64>>)> = series
        .into_iter()
        .map(|(symbol, rows)| (symbol, to_matrix(&rows)))
        .collect();

    let corpus: Vec<&Vec<f64>> = matrices.iter().flat_map(|(_, m)| m.iter()).collect();
    let mut scaler = MinMaxScaler::new(&FEATURE_COLUMNS);
    scaler.fit(&corpus)?;

    let config = model.forecaster(FEATURE_COUNT, scaler.column_index(TARGET_COLUMN)?);
    let mut windows = WindowSet::default();
    let mut used = Vec::new();

    for (symbol, matrix) in &matrices {
        let scaled = scaler.transform(matrix)?;
        match build_windows(&scaled, config.lookback, config.target_column) {
            Ok(set) => {
                info!("{}: {} training windows", symbol, set.len());
                windows.extend(set);
                used.push(symbol.clone());
            }
            Err(e @ ForecastError::InsufficientRows { .. }) => {
                warn!("Skipping {}: {}", symbol, e);
                skipped.push(SkippedSymbol {
                    symbol: symbol.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    if windows.is_empty() {
        return Err(ForecastError::EmptyInput(
            "no symbol has enough rows for a lookback window".into(),
        ));
    }

    let mut forecaster = Forecaster::new(config)?;
    let report = forecaster.train(&windows)?;
    let manifest = ArtifactManifest::new(key, used, skipped, &scaler, &forecaster, report);

    Ok(TrainedArtifact {
        manifest,
        scaler,
        forecaster,
    })
}
