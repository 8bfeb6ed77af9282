//! Forecast driver
//!
//! Fetches fresh bars, runs them through the stored scaler and forecaster,
//! and returns historical closes alongside `horizon` predicted closes.

use crate::artifacts::store::validate_key;
use crate::artifacts::{ArtifactRegistry, TrainedArtifact};
use crate::config::ForecastConfig;
use crate::data::{HistoryRange, PriceSource};
use crate::error::{ForecastError, Result};
use crate::ml::{
    denormalize_predictions, engineer_features, last_window, to_matrix, FEATURE_COLUMNS,
};
use crate::types::{ForecastResult, PriceBar, PriceHistory};
use chrono::Days;
use std::sync::Arc;
use tracing::info;

/// Caller input for one forecast; unset fields fall back to configuration
#[derive(Debug, Clone, Default)]
pub struct ForecastRequest {
    pub symbol: String,
    pub range: Option<HistoryRange>,
    pub horizon: Option<usize>,
    pub key: Option<String>,
}

impl ForecastRequest {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Default::default()
        }
    }
}

pub(crate) fn normalize_symbol(symbol: &str) -> Result<String> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(ForecastError::InvalidData("empty ticker symbol".into()));
    }
    Ok(symbol)
}

pub struct ForecastService {
    source: Arc<dyn PriceSource>,
    registry: Arc<ArtifactRegistry>,
    config: ForecastConfig,
}

impl ForecastService {
    pub fn new(
        source: Arc<dyn PriceSource>,
        registry: Arc<ArtifactRegistry>,
        config: ForecastConfig,
    ) -> Self {
        Self {
            source,
            registry,
            config,
        }
    }

    fn default_range(&self) -> Result<HistoryRange> {
        HistoryRange::parse(&self.config.range)
    }

    pub async fn forecast(&self, request: ForecastRequest) -> Result<ForecastResult> {
        let symbol = normalize_symbol(&request.symbol)?;
        let horizon = request.horizon.unwrap_or(self.config.horizon);
        if horizon == 0 {
            return Err(ForecastError::InvalidData("horizon must be positive".into()));
        }
        let range = match request.range {
            Some(range) => range,
            None => self.default_range()?,
        };
        let key = request.key.unwrap_or_else(|| self.config.default_key.clone());
        validate_key(&key)?;

        // fail fast before hitting the network when nothing is trained
        let registry = self.registry.clone();
        let artifact = tokio::task::spawn_blocking(move || registry.get(&key)).await??;

        let bars = self.source.fetch_bars(&symbol, &range).await?;
        let history_points = self.config.history_points;

        let result = tokio::task::spawn_blocking(move || {
            forecast_from_bars(&symbol, &bars, &artifact, horizon, history_points)
        })
        .await??;

        info!(
            "Forecast {} for {} days: {:?}",
            result.symbol, horizon, result.predicted_prices
        );
        Ok(result)
    }

    /// Closing prices and dates for charting
    pub async fn history(&self, symbol: &str, range: Option<HistoryRange>) -> Result<PriceHistory> {
        let symbol = normalize_symbol(symbol)?;
        let range = match range {
            Some(range) => range,
            None => self.default_range()?,
        };
        let bars = self.source.fetch_bars(&symbol, &range).await?;
        Ok(PriceHistory::from_bars(&symbol, &bars))
    }
}

/// Synchronous forecast over already fetched bars
pub fn forecast_from_bars(
    symbol: &str,
    bars: &[PriceBar],
    artifact: &TrainedArtifact,
    horizon: usize,
    history_points: usize,
) -> Result<ForecastResult> {
    artifact.scaler.ensure_columns(&FEATURE_COLUMNS)?;

    let rows = engineer_features(bars)?;
    let scaled = artifact.scaler.transform(&to_matrix(&rows))?;
    let seed = last_window(&scaled, artifact.lookback())?;

    let normalized = artifact.forecaster.forecast(&seed, horizon)?;
    let last_row = seed
        .last()
        .ok_or_else(|| ForecastError::EmptyInput("empty seed window".into()))?;
    let predicted_prices =
        denormalize_predictions(&artifact.scaler, last_row, artifact.target_column(), &normalized)?;

    let last_date = bars
        .last()
        .map(|b| b.date)
        .ok_or_else(|| ForecastError::EmptyInput("no price bars".into()))?;
    let predicted_dates = (1..=horizon as u64)
        .map(|d| last_date.checked_add_days(Days::new(d)))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ForecastError::InvalidData(format!("date overflow after {}", last_date)))?;

    let recent = &bars[bars.len().saturating_sub(history_points)..];

    Ok(ForecastResult {
        symbol: symbol.to_string(),
        historical_prices: recent.iter().map(|b| b.close).collect(),
        historical_dates: recent.iter().map(|b| b.date).collect(),
        predicted_prices,
        predicted_dates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::fixtures::{artifact_with_columns, trained_artifact};
    use crate::artifacts::ArtifactStore;
    use crate::data::MockPriceSource;
    use chrono::NaiveDate;
    use tempfile::{tempdir, TempDir};

    fn bars(n: usize) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| {
                let close = 10.0 + i as f64 * 0.5 + (i as f64).cos();
                PriceBar {
                    date: start.checked_add_days(Days::new(i as u64)).unwrap(),
                    open: close,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 100.0 + i as f64,
                }
            })
            .collect()
    }

    fn registry_with_model() -> (TempDir, Arc<ArtifactRegistry>) {
        let dir = tempdir().unwrap();
        let registry = ArtifactRegistry::new(ArtifactStore::new(dir.path()));
        registry.publish(trained_artifact("global")).unwrap();
        (dir, Arc::new(registry))
    }

    fn config(history_points: usize) -> ForecastConfig {
        ForecastConfig {
            history_points,
            ..Default::default()
        }
    }

    #[test]
    fn test_forecast_from_bars() {
        let artifact = trained_artifact("global");
        let bars = bars(40);

        let result = forecast_from_bars("AAPL", &bars, &artifact, 7, 720).unwrap();
        assert_eq!(result.predicted_prices.len(), 7);
        assert_eq!(result.predicted_dates.len(), 7);
        assert!(result.predicted_prices.iter().all(|p| p.is_finite()));

        // consecutive calendar days after the last bar
        let last = bars.last().unwrap().date;
        for (i, date) in result.predicted_dates.iter().enumerate() {
            assert_eq!(*date, last.checked_add_days(Days::new(i as u64 + 1)).unwrap());
        }
        assert_eq!(result.historical_prices.len(), 40);
    }

    #[test]
    fn test_history_points_trim() {
        let artifact = trained_artifact("global");
        let bars = bars(40);

        let result = forecast_from_bars("AAPL", &bars, &artifact, 1, 10).unwrap();
        assert_eq!(result.historical_prices.len(), 10);
        assert_eq!(result.historical_dates[0], bars[30].date);
        assert_eq!(result.historical_prices[9], bars[39].close);
    }

    #[test]
    fn test_forecast_too_few_rows() {
        let artifact = trained_artifact("global");
        // 22 bars give 3 feature rows, lookback is 4
        let err = forecast_from_bars("AAPL", &bars(22), &artifact, 7, 720).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientRows { lookback: 4, rows: 3 }));
    }

    #[test]
    fn test_forecast_rejects_mismatched_scaler() {
        let bars = bars(40);

        // scaler fitted on one column fewer than the pipeline produces
        let narrow = artifact_with_columns("global", &FEATURE_COLUMNS[..8]);
        match forecast_from_bars("AAPL", &bars, &narrow, 7, 720).unwrap_err() {
            ForecastError::SchemaMismatch { expected, found } => {
                assert!(expected.ends_with("close"));
                assert!(!found.contains("close"));
            }
            other => panic!("Expected SchemaMismatch, got {:?}", other),
        }

        // right width, wrong order
        let mut swapped = FEATURE_COLUMNS;
        swapped.swap(0, 1);
        let reordered = artifact_with_columns("global", &swapped);
        assert!(matches!(
            forecast_from_bars("AAPL", &bars, &reordered, 7, 720),
            Err(ForecastError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" aapl ").unwrap(), "AAPL");
        assert!(normalize_symbol("  ").is_err());
    }

    #[tokio::test]
    async fn test_service_forecast() {
        let (_dir, registry) = registry_with_model();
        let data = bars(50);

        let mut source = MockPriceSource::new();
        source.expect_fetch_bars().times(1).returning(move |symbol, range| {
            assert_eq!(symbol, "MSFT");
            assert_eq!(range, &HistoryRange::Period("2y".to_string()));
            Ok(data.clone())
        });

        let service = ForecastService::new(Arc::new(source), registry, config(720));
        let result = service.forecast(ForecastRequest::new("msft")).await.unwrap();

        assert_eq!(result.symbol, "MSFT");
        assert_eq!(result.predicted_prices.len(), 7);
        assert_eq!(result.historical_prices.len(), 50);
    }

    #[tokio::test]
    async fn test_service_custom_horizon_and_range() {
        let (_dir, registry) = registry_with_model();
        let data = bars(50);

        let mut source = MockPriceSource::new();
        source.expect_fetch_bars().times(1).returning(move |_, range| {
            assert_eq!(range, &HistoryRange::Period("5y".to_string()));
            Ok(data.clone())
        });

        let service = ForecastService::new(Arc::new(source), registry, config(720));
        let request = ForecastRequest {
            symbol: "AAPL".to_string(),
            range: Some(HistoryRange::Period("5y".to_string())),
            horizon: Some(3),
            key: Some("global".to_string()),
        };
        let result = service.forecast(request).await.unwrap();
        assert_eq!(result.predicted_dates.len(), 3);
    }

    #[tokio::test]
    async fn test_service_model_not_trained() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(ArtifactRegistry::new(ArtifactStore::new(dir.path())));

        let mut source = MockPriceSource::new();
        source.expect_fetch_bars().times(0);

        let service = ForecastService::new(Arc::new(source), registry, config(720));
        let err = service.forecast(ForecastRequest::new("AAPL")).await.unwrap_err();
        assert!(matches!(err, ForecastError::ModelNotTrained(_)));
    }

    #[tokio::test]
    async fn test_service_data_unavailable() {
        let (_dir, registry) = registry_with_model();

        let mut source = MockPriceSource::new();
        source.expect_fetch_bars().returning(|symbol, _| {
            Err(ForecastError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "timeout".to_string(),
            })
        });

        let service = ForecastService::new(Arc::new(source), registry, config(720));
        let err = service.forecast(ForecastRequest::new("AAPL")).await.unwrap_err();
        assert!(matches!(err, ForecastError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_service_rejects_zero_horizon_and_bad_key() {
        let (_dir, registry) = registry_with_model();
        let service = ForecastService::new(Arc::new(MockPriceSource::new()), registry, config(720));

        let request = ForecastRequest {
            horizon: Some(0),
            ..ForecastRequest::new("AAPL")
        };
        assert!(matches!(
            service.forecast(request).await,
            Err(ForecastError::InvalidData(_))
        ));

        let request = ForecastRequest {
            key: Some("../escape".to_string()),
            ..ForecastRequest::new("AAPL")
        };
        assert!(matches!(
            service.forecast(request).await,
            Err(ForecastError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_service_history() {
        let (_dir, registry) = registry_with_model();
        let data = bars(5);

        let mut source = MockPriceSource::new();
        source
            .expect_fetch_bars()
            .returning(move |_, _| Ok(data.clone()));

        let service = ForecastService::new(Arc::new(source), registry, config(720));
        let history = tokio_test::block_on(service.history("tsla", None)).unwrap();
        assert_eq!(history.symbol, "TSLA");
        assert_eq!(history.prices.len(), 5);
        assert_eq!(history.labels.len(), 5);
    }
}
