//! Sliding lookback windows over a normalized matrix

use crate::error::{ForecastError, Result};

pub const DEFAULT_LOOKBACK: usize = 60;

/// `lookback` contiguous normalized rows, oldest first
pub type Window = Vec<Vec<f64>>;

/// Training windows with the target that follows each one
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSet {
    pub windows: Vec<Window>,
    pub targets: Vec<f64>,
}

impl WindowSet {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Append another set; windows from different series are never joined
    pub fn extend(&mut self, other: WindowSet) {
        self.windows.extend(other.windows);
        self.targets.extend(other.targets);
    }

    /// Columns per row, if any window exists
    pub fn width(&self) -> Option<usize> {
        self.windows.first().and_then(|w| w.first()).map(|r| r.len())
    }
}

/// Build `(window, target)` pairs
///
/// For each `i` in `lookback..n` the window is `rows[i - lookback..i]` and the
/// target is `rows[i][target_column]`, giving exactly `n - lookback` pairs.
pub fn build_windows(rows: &[Vec<f64>], lookback: usize, target_column: usize) -> Result<WindowSet> {
    if lookback == 0 || rows.len() <= lookback {
        return Err(ForecastError::InsufficientRows {
            lookback,
            rows: rows.len(),
        });
    }

    let width = rows[0].len();
    if target_column >= width {
        return Err(ForecastError::SchemaMismatch {
            expected: format!("target column < {}", width),
            found: format!("target column {}", target_column),
        });
    }
    if let Some(bad) = rows.iter().find(|r| r.len() != width) {
        return Err(ForecastError::width_mismatch(width, bad.len()));
    }

    let count = rows.len() - lookback;
    let mut set = WindowSet {
        windows: Vec::with_capacity(count),
        targets: Vec::with_capacity(count),
    };

    for i in lookback..rows.len() {
        set.windows.push(rows[i - lookback..i].to_vec());
        set.targets.push(rows[i][target_column]);
    }

    Ok(set)
}

/// The final `lookback` rows, used to seed inference
pub fn last_window(rows: &[Vec<f64>], lookback: usize) -> Result<Window> {
    if lookback == 0 || rows.len() < lookback {
        return Err(ForecastError::InsufficientRows {
            lookback,
            rows: rows.len(),
        });
    }
    Ok(rows[rows.len() - lookback..].to_vec())
}
