//! Regression error metrics

use crate::error::{ForecastError, Result};

fn check(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.is_empty() {
        return Err(ForecastError::EmptyInput("no samples to score".into()));
    }
    if actual.len() != predicted.len() {
        return Err(ForecastError::InvalidData(format!(
            "{} actual values but {} predictions",
            actual.len(),
            predicted.len()
        )));
    }
    Ok(())
}

/// Mean absolute error
pub fn mae(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check(actual, predicted)?;
    let sum: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()).sum();
    Ok(sum / actual.len() as f64)
}

/// Mean squared error
pub fn mse(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check(actual, predicted)?;
    let sum: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
    Ok(sum / actual.len() as f64)
}

/// Root mean squared error
pub fn rmse(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    Ok(mse(actual, predicted)?.sqrt())
}
