//! Core data types shared across the pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One trading day of price/volume data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// All OHLCV fields are finite numbers
    pub fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Forecast result returned to callers
///
/// Dates serialize as ISO `YYYY-MM-DD` strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub symbol: String,
    pub historical_prices: Vec<f64>,
    pub historical_dates: Vec<NaiveDate>,
    pub predicted_prices: Vec<f64>,
    pub predicted_dates: Vec<NaiveDate>,
}

/// Closing price history for charting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub symbol: String,
    pub prices: Vec<f64>,
    pub labels: Vec<NaiveDate>,
}

impl PriceHistory {
    pub fn from_bars(symbol: &str, bars: &[PriceBar]) -> Self {
        Self {
            symbol: symbol.to_string(),
            prices: bars.iter().map(|b| b.close).collect(),
            labels: bars.iter().map(|b| b.date).collect(),
        }
    }
}
