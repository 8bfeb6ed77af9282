//! Trained artifact persistence
//!
//! A trained artifact is the fitted scaler, the forecaster weights and a
//! manifest describing how they were produced. The store keeps immutable
//! numbered versions per key; the registry caches loaded artifacts in memory.

pub mod registry;
pub mod store;

pub use registry::ArtifactRegistry;
pub use store::ArtifactStore;

use crate::ml::{Forecaster, ForecasterConfig, MinMaxScaler, TrainingReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A symbol left out of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: String,
}

/// Metadata stored next to every artifact version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub run_id: Uuid,
    pub key: String,
    /// Assigned by the store on save; 0 until then
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub symbols: Vec<String>,
    #[serde(default)]
    pub skipped_symbols: Vec<SkippedSymbol>,
    pub columns: Vec<String>,
    pub target_column: String,
    pub forecaster: ForecasterConfig,
    pub report: TrainingReport,
    #[serde(default)]
    pub scaler_sha256: String,
    #[serde(default)]
    pub model_sha256: String,
}

impl ArtifactManifest {
    /// Manifest for a run that has not been saved yet
    pub fn new(
        key: &str,
        symbols: Vec<String>,
        skipped_symbols: Vec<SkippedSymbol>,
        scaler: &MinMaxScaler,
        forecaster: &Forecaster,
        report: TrainingReport,
    ) -> Self {
        let config = forecaster.config().clone();
        let target_column = scaler
            .columns()
            .get(config.target_column)
            .cloned()
            .unwrap_or_default();

        Self {
            run_id: Uuid::new_v4(),
            key: key.to_string(),
            version: 0,
            created_at: Utc::now(),
            symbols,
            skipped_symbols,
            columns: scaler.columns().to_vec(),
            target_column,
            forecaster: config,
            report,
            scaler_sha256: String::new(),
            model_sha256: String::new(),
        }
    }

    /// `v0003` style label
    pub fn version_label(&self) -> String {
        store::version_dir_name(self.version)
    }
}

/// Scaler, forecaster and manifest loaded together
#[derive(Debug)]
pub struct TrainedArtifact {
    pub manifest: ArtifactManifest,
    pub scaler: MinMaxScaler,
    pub forecaster: Forecaster,
}

impl TrainedArtifact {
    pub fn key(&self) -> &str {
        &self.manifest.key
    }

    pub fn version(&self) -> u32 {
        self.manifest.version
    }

    pub fn lookback(&self) -> usize {
        self.forecaster.config().lookback
    }

    pub fn target_column(&self) -> usize {
        self.forecaster.config().target_column
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;

    #[test]
    fn test_manifest_describes_run() {
        let artifact = trained_artifact("global");
        let manifest = &artifact.manifest;

        assert_eq!(manifest.key, "global");
        assert_eq!(manifest.version, 0);
        assert_eq!(manifest.columns.len(), 9);
        assert_eq!(manifest.target_column, "close");
        assert_eq!(manifest.skipped_symbols[0].symbol, "ZZZZ");
        assert_eq!(manifest.report.epochs_run, 1);
        assert_eq!(artifact.lookback(), 4);
        assert_eq!(artifact.target_column(), 8);
    }

    #[test]
    fn test_manifest_json_round_trip() {
        let manifest = trained_artifact("global").manifest;
        let json = serde_json::to_string(&manifest).unwrap();
        let back: super::ArtifactManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, manifest);
    }
}
