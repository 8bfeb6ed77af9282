//! Technical indicator feature engineering
//!
//! Turns daily price bars into fixed-width feature rows:
//! - SMA-5 / SMA-20 of close
//! - RSI-14 over simple rolling means of gains and losses
//! - EMA-10 and MACD (EMA-12 − EMA-26), recursive with no bias adjustment
//! - Volume, 4-day momentum, 14-day stochastic %K, close
//!
//! Rows without full history for every indicator are dropped.

use crate::error::{ForecastError, Result};
use crate::types::PriceBar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const SMA_SHORT: usize = 5;
pub const SMA_LONG: usize = 20;
pub const RSI_PERIOD: usize = 14;
pub const EMA_SPAN: usize = 10;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MOMENTUM_LAG: usize = 4;
pub const STOCHASTIC_PERIOD: usize = 14;

/// Longest trailing window; the first `MIN_BARS - 1` bars never yield a row
pub const MIN_BARS: usize = SMA_LONG;

/// Column names in matrix order
pub const FEATURE_COLUMNS: [&str; 9] = [
    "sma_5",
    "sma_20",
    "rsi_14",
    "ema_10",
    "macd",
    "volume",
    "momentum_4",
    "stochastic_k",
    "close",
];

/// Column the forecaster predicts
pub const TARGET_COLUMN: &str = "close";

pub const FEATURE_COUNT: usize = FEATURE_COLUMNS.len();

/// Engineered features for one trading day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub sma_5: f64,
    pub sma_20: f64,
    pub rsi_14: f64,
    pub ema_10: f64,
    pub macd: f64,
    pub volume: f64,
    pub momentum_4: f64,
    pub stochastic_k: f64,
    pub close: f64,
}

impl FeatureRow {
    /// Values in [`FEATURE_COLUMNS`] order
    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        [
            self.sma_5,
            self.sma_20,
            self.rsi_14,
            self.ema_10,
            self.macd,
            self.volume,
            self.momentum_4,
            self.stochastic_k,
            self.close,
        ]
    }
}

/// Feature rows as a plain matrix for scaling and windowing
pub fn to_matrix(rows: &[FeatureRow]) -> Vec<Vec<f64>> {
    rows.iter().map(|r| r.values().to_vec()).collect()
}

/// Compute feature rows for a chronological bar series
///
/// Needs at least [`MIN_BARS`] bars; `n` bars produce `n - (MIN_BARS - 1)` rows.
pub fn engineer_features(bars: &[PriceBar]) -> Result<Vec<FeatureRow>> {
    if bars.len() < MIN_BARS {
        return Err(ForecastError::InsufficientHistory {
            required: MIN_BARS,
            available: bars.len(),
        });
    }
    if let Some(bad) = bars.iter().find(|b| !b.is_finite()) {
        return Err(ForecastError::InvalidData(format!(
            "non-finite price bar on {}",
            bad.date
        )));
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();

    let sma_5 = sma(&closes, SMA_SHORT);
    let sma_20 = sma(&closes, SMA_LONG);
    let rsi_14 = rsi(&closes, RSI_PERIOD);
    let ema_10 = ema(&closes, EMA_SPAN);
    let ema_fast = ema(&closes, MACD_FAST);
    let ema_slow = ema(&closes, MACD_SLOW);
    let momentum = momentum(&closes, MOMENTUM_LAG);
    let stoch = stochastic_k(&closes, &highs, &lows, STOCHASTIC_PERIOD);

    let rows = bars
        .iter()
        .enumerate()
        .filter_map(|(i, bar)| {
            Some(FeatureRow {
                date: bar.date,
                sma_5: sma_5[i]?,
                sma_20: sma_20[i]?,
                rsi_14: rsi_14[i]?,
                ema_10: ema_10[i],
                macd: ema_fast[i] - ema_slow[i],
                volume: bar.volume,
                momentum_4: momentum[i]?,
                stochastic_k: stoch[i]?,
                close: bar.close,
            })
        })
        .collect();

    Ok(rows)
}

/// Trailing arithmetic mean; `None` until `period` values are available
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if period == 0 || i + 1 < period {
                None
            } else {
                let window = &values[i + 1 - period..=i];
                Some(window.iter().sum::<f64>() / period as f64)
            }
        })
        .collect()
}

/// Recursive EMA seeded with the first value, `alpha = 2 / (span + 1)`
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;

    for &v in values {
        let next = match prev {
            Some(p) => p + alpha * (v - p),
            None => v,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// RSI over simple rolling means of the last `period` close deltas
///
/// An average loss of zero yields exactly 100.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut gains = vec![0.0; closes.len()];
    let mut losses = vec![0.0; closes.len()];
    for i in 1..closes.len() {
        let delta = closes[i] - closes[i - 1];
        gains[i] = delta.max(0.0);
        losses[i] = (-delta).max(0.0);
    }

    (0..closes.len())
        .map(|i| {
            if period == 0 || i < period {
                return None;
            }
            let range = i + 1 - period..=i;
            let avg_gain = gains[range.clone()].iter().sum::<f64>() / period as f64;
            let avg_loss = losses[range].iter().sum::<f64>() / period as f64;

            if avg_loss == 0.0 {
                return Some(100.0);
            }
            let rs = avg_gain / avg_loss;
            Some(100.0 - 100.0 / (1.0 + rs))
        })
        .collect()
}

/// `close[t] - close[t - lag]`
pub fn momentum(closes: &[f64], lag: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|i| (i >= lag).then(|| closes[i] - closes[i - lag]))
        .collect()
}

/// Stochastic %K over a trailing high/low window
///
/// A flat window (highest high equals lowest low) yields 0.
pub fn stochastic_k(closes: &[f64], highs: &[f64], lows: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|i| {
            if period == 0 || i + 1 < period {
                return None;
            }
            let start = i + 1 - period;
            let lowest = lows[start..=i].iter().copied().fold(f64::INFINITY, f64::min);
            let highest = highs[start..=i].iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let range = highest - lowest;

            if range == 0.0 {
                Some(0.0)
            } else {
                Some(100.0 * (closes[i] - lowest) / range)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn bars_from_closes(closes: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                date: start.checked_add_days(Days::new(i as u64)).unwrap(),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 1_000.0 + i as f64,
            })
            .collect()
    }

    fn wavy(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1)
            .collect()
    }

    #[test]
    fn test_sma_values() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let out = sma(&values, 5);
        assert_eq!(out[3], None);
        assert_eq!(out[4], Some(3.0));
        assert_eq!(out[5], Some(4.0));
    }

    #[test]
    fn test_ema_is_recursive_without_adjustment() {
        let values = [10.0, 20.0, 30.0];
        let out = ema(&values, 3);
        // alpha = 0.5
        assert_eq!(out[0], 10.0);
        assert_eq!(out[1], 15.0);
        assert_eq!(out[2], 22.5);
    }

    #[test]
    fn test_macd_of_constant_series_is_zero() {
        let closes = vec![50.0; 40];
        let fast = ema(&closes, MACD_FAST);
        let slow = ema(&closes, MACD_SLOW);
        for i in 0..closes.len() {
            assert_eq!(fast[i] - slow[i], 0.0);
        }
    }

    #[test]
    fn test_rsi_uptrend_is_100() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&closes, 14);
        assert_eq!(out[13], None);
        assert_eq!(out[14], Some(100.0));
        assert_eq!(out[29], Some(100.0));
    }

    #[test]
    fn test_rsi_downtrend_is_0() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let out = rsi(&closes, 14);
        assert_eq!(out[20], Some(0.0));
    }

    #[test]
    fn test_rsi_flat_is_100() {
        let closes = vec![42.0; 20];
        let out = rsi(&closes, 14);
        assert!(out[14..].iter().all(|v| *v == Some(100.0)));
    }

    #[test]
    fn test_rsi_balanced_moves() {
        // Alternating +1 / -1 moves: equal average gain and loss
        let closes: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect();
        let out = rsi(&closes, 14);
        let value = out[29].unwrap();
        assert!((value - 50.0).abs() < 1e-9, "RSI was {}", value);
    }

    #[test]
    fn test_rsi_bounded() {
        let closes = wavy(200);
        for value in rsi(&closes, 14).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn test_momentum_lag() {
        let closes = [1.0, 2.0, 4.0, 8.0, 16.0, 32.0];
        let out = momentum(&closes, 4);
        assert_eq!(out[3], None);
        assert_eq!(out[4], Some(15.0));
        assert_eq!(out[5], Some(30.0));
    }

    #[test]
    fn test_stochastic_flat_range_is_zero() {
        let values = vec![7.0; 20];
        let out = stochastic_k(&values, &values, &values, 14);
        assert_eq!(out[12], None);
        assert!(out[13..].iter().all(|v| *v == Some(0.0)));
    }

    #[test]
    fn test_stochastic_extremes() {
        let closes: Vec<f64> = (0..14).map(|i| i as f64).collect();
        let out = stochastic_k(&closes, &closes, &closes, 14);
        // close at the window high
        assert_eq!(out[13], Some(100.0));

        let falling: Vec<f64> = (0..14).map(|i| 14.0 - i as f64).collect();
        let out = stochastic_k(&falling, &falling, &falling, 14);
        assert_eq!(out[13], Some(0.0));
    }

    #[test]
    fn test_engineer_features_drops_warmup() {
        let bars = bars_from_closes(&wavy(50));
        let rows = engineer_features(&bars).unwrap();

        assert_eq!(rows.len(), 50 - (MIN_BARS - 1));
        assert_eq!(rows[0].date, bars[MIN_BARS - 1].date);
        assert_eq!(rows.last().unwrap().date, bars[49].date);
    }

    #[test]
    fn test_engineer_features_values() {
        let closes = wavy(40);
        let bars = bars_from_closes(&closes);
        let rows = engineer_features(&bars).unwrap();

        let last = rows.last().unwrap();
        let expected_sma5 = closes[35..40].iter().sum::<f64>() / 5.0;
        let expected_sma20 = closes[20..40].iter().sum::<f64>() / 20.0;
        assert!((last.sma_5 - expected_sma5).abs() < 1e-9);
        assert!((last.sma_20 - expected_sma20).abs() < 1e-9);
        assert_eq!(last.momentum_4, closes[39] - closes[35]);
        assert_eq!(last.close, closes[39]);
        assert_eq!(last.volume, 1_039.0);

        let ema10 = ema(&closes, 10);
        assert_eq!(last.ema_10, ema10[39]);
    }

    #[test]
    fn test_engineer_features_no_nan() {
        let bars = bars_from_closes(&wavy(120));
        let rows = engineer_features(&bars).unwrap();
        for row in &rows {
            assert!(row.values().iter().all(|v| v.is_finite()));
            assert!((0.0..=100.0).contains(&row.rsi_14));
            assert!((0.0..=100.0).contains(&row.stochastic_k));
        }
    }

    #[test]
    fn test_engineer_features_insufficient_history() {
        let bars = bars_from_closes(&wavy(19));
        let err = engineer_features(&bars).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientHistory { required: 20, available: 19 }
        ));
    }

    #[test]
    fn test_engineer_features_exact_minimum() {
        let bars = bars_from_closes(&wavy(20));
        assert_eq!(engineer_features(&bars).unwrap().len(), 1);
    }

    #[test]
    fn test_engineer_features_rejects_non_finite() {
        let mut bars = bars_from_closes(&wavy(30));
        bars[10].close = f64::NAN;
        let err = engineer_features(&bars).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidData(_)));
    }

    #[test]
    fn test_row_values_follow_column_order() {
        let bars = bars_from_closes(&wavy(25));
        let row = engineer_features(&bars).unwrap()[0];
        let values = row.values();
        assert_eq!(values.len(), FEATURE_COLUMNS.len());
        let target = FEATURE_COLUMNS.iter().position(|c| *c == TARGET_COLUMN).unwrap();
        assert_eq!(values[target], row.close);
        assert_eq!(values[2], row.rsi_14);
    }
}
