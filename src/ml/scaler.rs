//! Per-column min-max normalization
//!
//! The scaler remembers the column names it was built for and refuses
//! matrices of a different shape, so a persisted scaler can never silently
//! misalign features when it is reloaded next to a different pipeline.

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Min/max observed per column at fit time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ColumnStats {
    min: Vec<f64>,
    max: Vec<f64>,
}

/// Min-max scaler mapping every column into `feature_range`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    columns: Vec<String>,
    feature_range: (f64, f64),
    stats: Option<ColumnStats>,
}

impl MinMaxScaler {
    /// Unfitted scaler over `columns` with range `[0, 1]`
    pub fn new<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            feature_range: (0.0, 1.0),
            stats: None,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    /// Position of a named column
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| ForecastError::SchemaMismatch {
                expected: format!("column '{}'", name),
                found: self.columns.join(","),
            })
    }

    /// Fail unless the scaler's columns are exactly `expected`, in order
    pub fn ensure_columns<S: AsRef<str>>(&self, expected: &[S]) -> Result<()> {
        let matches = self.columns.len() == expected.len()
            && self
                .columns
                .iter()
                .zip(expected)
                .all(|(have, want)| have == want.as_ref());

        if matches {
            Ok(())
        } else {
            Err(ForecastError::SchemaMismatch {
                expected: expected
                    .iter()
                    .map(|s| s.as_ref())
                    .collect::<Vec<_>>()
                    .join(","),
                found: self.columns.join(","),
            })
        }
    }

    /// Learn per-column min and max
    pub fn fit<R: AsRef<[f64]>>(&mut self, rows: &[R]) -> Result<()> {
        if rows.is_empty() {
            return Err(ForecastError::EmptyInput("cannot fit scaler on zero rows".into()));
        }

        let width = self.n_features();
        let mut min = vec![f64::INFINITY; width];
        let mut max = vec![f64::NEG_INFINITY; width];

        for row in rows {
            let row = self.check_width(row.as_ref())?;
            for (j, &v) in row.iter().enumerate() {
                if !v.is_finite() {
                    return Err(ForecastError::InvalidData(format!(
                        "non-finite value in column '{}'",
                        self.columns[j]
                    )));
                }
                min[j] = min[j].min(v);
                max[j] = max[j].max(v);
            }
        }

        self.stats = Some(ColumnStats { min, max });
        Ok(())
    }

    /// Map rows into the feature range
    pub fn transform<R: AsRef<[f64]>>(&self, rows: &[R]) -> Result<Vec<Vec<f64>>> {
        let stats = self.stats.as_ref().ok_or(ForecastError::NotFitted)?;
        let (lower, upper) = self.feature_range;

        rows.iter()
            .map(|row| {
                let row = self.check_width(row.as_ref())?;
                Ok(row
                    .iter()
                    .enumerate()
                    .map(|(j, &v)| {
                        let span = stats.max[j] - stats.min[j];
                        if span == 0.0 {
                            lower
                        } else {
                            lower + (v - stats.min[j]) / span * (upper - lower)
                        }
                    })
                    .collect())
            })
            .collect()
    }

    /// Map scaled rows back to original units
    pub fn inverse_transform<R: AsRef<[f64]>>(&self, rows: &[R]) -> Result<Vec<Vec<f64>>> {
        let stats = self.stats.as_ref().ok_or(ForecastError::NotFitted)?;
        let (lower, upper) = self.feature_range;

        rows.iter()
            .map(|row| {
                let row = self.check_width(row.as_ref())?;
                Ok(row
                    .iter()
                    .enumerate()
                    .map(|(j, &v)| {
                        let span = stats.max[j] - stats.min[j];
                        if span == 0.0 {
                            stats.min[j]
                        } else {
                            stats.min[j] + (v - lower) / (upper - lower) * span
                        }
                    })
                    .collect())
            })
            .collect()
    }

    pub fn fit_transform<R: AsRef<[f64]>>(&mut self, rows: &[R]) -> Result<Vec<Vec<f64>>> {
        self.fit(rows)?;
        self.transform(rows)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let scaler: Self = serde_json::from_str(json)?;
        if let Some(stats) = &scaler.stats {
            if stats.min.len() != scaler.columns.len() || stats.max.len() != scaler.columns.len() {
                return Err(ForecastError::width_mismatch(
                    scaler.columns.len(),
                    stats.min.len().max(stats.max.len()),
                ));
            }
        }
        Ok(scaler)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    fn check_width<'a>(&self, row: &'a [f64]) -> Result<&'a [f64]> {
        if row.len() == self.n_features() {
            Ok(row)
        } else {
            Err(ForecastError::width_mismatch(self.n_features(), row.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Vec<Vec<f64>> {
        vec![
            vec![1.0, 100.0, 5.0],
            vec![3.0, 300.0, 5.0],
            vec![2.0, 250.0, 5.0],
        ]
    }

    fn fitted() -> MinMaxScaler {
        let mut scaler = MinMaxScaler::new(&["a", "b", "c"]);
        scaler.fit(&sample()).unwrap();
        scaler
    }

    #[test]
    fn test_transform_maps_into_unit_range() {
        let scaled = fitted().transform(&sample()).unwrap();
        assert_eq!(scaled[0][0], 0.0);
        assert_eq!(scaled[1][0], 1.0);
        assert_eq!(scaled[2][0], 0.5);
        assert_eq!(scaled[2][1], 0.75);
    }

    #[test]
    fn test_constant_column_maps_to_lower_bound() {
        let scaler = fitted();
        let scaled = scaler.transform(&sample()).unwrap();
        assert!(scaled.iter().all(|row| row[2] == 0.0));

        let restored = scaler.inverse_transform(&scaled).unwrap();
        assert!(restored.iter().all(|row| row[2] == 5.0));
    }

    #[test]
    fn test_inverse_round_trip() {
        let scaler = fitted();
        let rows = vec![vec![1.7, 123.4, 5.0], vec![2.9, 299.0, 5.0]];
        let restored = scaler
            .inverse_transform(&scaler.transform(&rows).unwrap())
            .unwrap();

        for (orig, back) in rows.iter().zip(&restored) {
            for (a, b) in orig.iter().zip(back) {
                assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_not_fitted() {
        let scaler = MinMaxScaler::new(&["a"]);
        assert!(matches!(scaler.transform(&[[1.0]]), Err(ForecastError::NotFitted)));
        assert!(matches!(
            scaler.inverse_transform(&[[1.0]]),
            Err(ForecastError::NotFitted)
        ));
    }

    #[test]
    fn test_fit_empty_input() {
        let mut scaler = MinMaxScaler::new(&["a"]);
        let rows: Vec<Vec<f64>> = Vec::new();
        assert!(matches!(scaler.fit(&rows), Err(ForecastError::EmptyInput(_))));
    }

    #[test]
    fn test_width_mismatch() {
        let scaler = fitted();
        let err = scaler.transform(&[[1.0, 2.0]]).unwrap_err();
        match err {
            ForecastError::SchemaMismatch { expected, found } => {
                assert_eq!(expected, "3 columns");
                assert_eq!(found, "2 columns");
            }
            other => panic!("Expected SchemaMismatch, got {:?}", other),
        }

        let mut fresh = MinMaxScaler::new(&["a", "b"]);
        assert!(matches!(
            fresh.fit(&[[1.0, 2.0, 3.0]]),
            Err(ForecastError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_column_lookup_and_guard() {
        let scaler = fitted();
        assert_eq!(scaler.column_index("b").unwrap(), 1);
        assert!(scaler.column_index("z").is_err());

        assert!(scaler.ensure_columns(&["a", "b", "c"]).is_ok());
        assert!(scaler.ensure_columns(&["a", "c", "b"]).is_err());
        assert!(scaler.ensure_columns(&["a", "b"]).is_err());
    }

    #[test]
    fn test_save_and_load_bit_for_bit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scaler.json");

        let mut scaler = MinMaxScaler::new(&["p", "q"]);
        scaler
            .fit(&[[0.1 + 0.2, 1.0 / 3.0], [std::f64::consts::PI, 1e-17]])
            .unwrap();
        scaler.save(&path).unwrap();

        let loaded = MinMaxScaler::load(&path).unwrap();
        assert_eq!(loaded, scaler);

        let probe = [[1.2345678901234567, 0.2]];
        let a = scaler.transform(&probe).unwrap();
        let b = loaded.transform(&probe).unwrap();
        assert_eq!(a[0][0].to_bits(), b[0][0].to_bits());
        assert_eq!(a[0][1].to_bits(), b[0][1].to_bits());
    }

    #[test]
    fn test_from_json_rejects_inconsistent_stats() {
        let json = r#"{"columns":["a","b"],"feature_range":[0.0,1.0],"stats":{"min":[0.0],"max":[1.0]}}"#;
        assert!(matches!(
            MinMaxScaler::from_json(json),
            Err(ForecastError::SchemaMismatch { .. })
        ));
    }
}
