//! Async orchestration over the pipeline
//!
//! - `forecast`: serve forecasts and price history
//! - `training`: build and publish artifacts out of band
//! - `evaluate`: score a stored model on historical data

pub mod evaluate;
pub mod forecast;
pub mod training;

pub use evaluate::{EvaluationReport, EvaluationService};
pub use forecast::{forecast_from_bars, ForecastRequest, ForecastService};
pub use training::{TrainingJob, TrainingService};

use crate::artifacts::{ArtifactRegistry, ArtifactStore};
use crate::config::Config;
use crate::data::{PriceSource, YahooClient};
use crate::error::Result;
use std::sync::Arc;
use tracing::info;

/// Every service wired to one price source and one registry
pub struct Services {
    pub registry: Arc<ArtifactRegistry>,
    pub forecast: ForecastService,
    pub training: Arc<TrainingService>,
    pub evaluation: EvaluationService,
}

impl Services {
    /// Production wiring: Yahoo source and the configured artifact directory
    pub fn from_config(config: &Config) -> Result<Self> {
        let source: Arc<dyn PriceSource> = Arc::new(YahooClient::new(&config.data)?);
        let root = config.artifacts.resolved_dir()?;
        info!("Artifacts at {}", root.display());
        Ok(Self::with_source(config, source, ArtifactStore::new(root)))
    }

    pub fn with_source(config: &Config, source: Arc<dyn PriceSource>, store: ArtifactStore) -> Self {
        let registry = Arc::new(ArtifactRegistry::new(store));
        Self {
            forecast: ForecastService::new(source.clone(), registry.clone(), config.forecast.clone()),
            training: Arc::new(TrainingService::new(
                source.clone(),
                registry.clone(),
                config.model.clone(),
            )),
            evaluation: EvaluationService::new(source, registry.clone()),
            registry,
        }
    }
}
