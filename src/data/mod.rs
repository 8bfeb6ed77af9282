//! Price history sources
//!
//! The pipeline only sees the [`PriceSource`] trait; [`YahooClient`] is the
//! production implementation.

pub mod yahoo;

pub use yahoo::YahooClient;

use crate::error::{ForecastError, Result};
use crate::types::PriceBar;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

/// Periods accepted by the chart API
pub const PERIODS: &[&str] = &["1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "ytd", "max"];

/// How much history to request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryRange {
    /// Trailing period such as `2y`
    Period(String),
    /// Inclusive calendar range
    Between { start: NaiveDate, end: NaiveDate },
}

impl HistoryRange {
    /// Parse `2y` style periods or `2022-01-01..2024-01-01` date ranges
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some((start, end)) = s.split_once("..") {
            let start = parse_date(start)?;
            let end = parse_date(end)?;
            if start > end {
                return Err(ForecastError::Config(format!(
                    "range start {} is after end {}",
                    start, end
                )));
            }
            return Ok(HistoryRange::Between { start, end });
        }

        if PERIODS.contains(&s) {
            Ok(HistoryRange::Period(s.to_string()))
        } else {
            Err(ForecastError::Config(format!(
                "unknown history range '{}', expected one of {:?} or START..END",
                s, PERIODS
            )))
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| ForecastError::Config(format!("invalid date '{}': {}", s.trim(), e)))
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryRange::Period(p) => write!(f, "{}", p),
            HistoryRange::Between { start, end } => write!(f, "{}..{}", start, end),
        }
    }
}

/// Source of daily price bars
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Chronological daily bars for `symbol`
    ///
    /// Failures surface as [`ForecastError::DataUnavailable`].
    async fn fetch_bars(&self, symbol: &str, range: &HistoryRange) -> Result<Vec<PriceBar>>;
}
