//! Yahoo Finance chart API client
//!
//! Fetches daily OHLCV bars with an explicit request timeout and a bounded
//! number of retries (exponential backoff) for transient failures.

use super::{HistoryRange, PriceSource};
use crate::config::DataConfig;
use crate::error::{ForecastError, Result};
use crate::types::PriceBar;
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound for a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Why a single attempt failed
#[derive(Debug)]
enum FetchFailure {
    /// Timeouts, connection errors, 429 and 5xx
    Transient(String),
    Permanent(String),
}

/// Chart API client
#[derive(Clone)]
pub struct YahooClient {
    http: Client,
    base_url: Url,
    max_retries: u32,
    retry_backoff: Duration,
}

impl YahooClient {
    pub fn new(config: &DataConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ForecastError::Config(format!("invalid base_url {:?}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ForecastError::Config(format!(
                "base_url {:?} cannot hold a path",
                config.base_url
            )));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            base_url,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// Chart endpoint for `symbol`, escaped as a single path segment
    fn chart_url(&self, symbol: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v8", "finance", "chart", symbol]);
        }
        url
    }

    fn query_params(range: &HistoryRange) -> Vec<(&'static str, String)> {
        let mut params = vec![("interval", "1d".to_string())];
        match range {
            HistoryRange::Period(period) => params.push(("range", period.clone())),
            HistoryRange::Between { start, end } => {
                // period2 is exclusive, so step past the end date
                let end = end.checked_add_days(Days::new(1)).unwrap_or(*end);
                params.push(("period1", midnight_timestamp(*start).to_string()));
                params.push(("period2", midnight_timestamp(end).to_string()));
            }
        }
        params
    }

    async fn fetch_once(
        &self,
        symbol: &str,
        range: &HistoryRange,
    ) -> std::result::Result<Vec<PriceBar>, FetchFailure> {
        let url = self.chart_url(symbol);
        debug!("Fetching {} ({}) from {}", symbol, range, url);

        let resp = self
            .http
            .get(url)
            .query(&Self::query_params(range))
            .send()
            .await
            .map_err(|e| FetchFailure::Transient(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(FetchFailure::Transient(format!("HTTP {}", status)));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| FetchFailure::Transient(e.to_string()))?;

        match parse_chart(&body) {
            Ok(bars) => Ok(bars),
            Err(reason) if status.is_success() => Err(FetchFailure::Permanent(reason)),
            Err(reason) => Err(FetchFailure::Permanent(format!("HTTP {}: {}", status, reason))),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.retry_backoff
            .checked_mul(factor)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}

#[async_trait]
impl PriceSource for YahooClient {
    async fn fetch_bars(&self, symbol: &str, range: &HistoryRange) -> Result<Vec<PriceBar>> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(symbol, range).await {
                Ok(bars) => {
                    info!("Fetched {} bars for {}", bars.len(), symbol);
                    return Ok(bars);
                }
                Err(FetchFailure::Transient(reason)) if attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "Fetch for {} failed ({}), retry {}/{} in {:?}",
                        symbol,
                        reason,
                        attempt + 1,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(FetchFailure::Transient(reason)) | Err(FetchFailure::Permanent(reason)) => {
                    return Err(ForecastError::DataUnavailable {
                        symbol: symbol.to_string(),
                        reason,
                    });
                }
            }
        }
    }
}

fn midnight_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Decode a chart response body into chronological bars
///
/// Rows with any missing field are skipped; duplicate dates keep the first row.
fn parse_chart(body: &str) -> std::result::Result<Vec<PriceBar>, String> {
    let response: ChartResponse =
        serde_json::from_str(body).map_err(|e| format!("malformed response: {}", e))?;

    if let Some(error) = response.chart.error {
        return Err(format!("{}: {}", error.code, error.description));
    }

    let data = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| "no chart result".to_string())?;

    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| "no quote data".to_string())?;

    let offset = data.meta.gmtoffset;
    let mut bars = Vec::with_capacity(data.timestamp.len());

    for (i, &ts) in data.timestamp.iter().enumerate() {
        let field = |series: &Vec<Option<f64>>| series.get(i).copied().flatten();
        let date = DateTime::from_timestamp(ts + offset, 0).map(|dt| dt.date_naive());

        if let (Some(date), Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
            date,
            field(&quote.open),
            field(&quote.high),
            field(&quote.low),
            field(&quote.close),
            field(&quote.volume),
        ) {
            bars.push(PriceBar {
                date,
                open,
                high,
                low,
                close,
                volume,
            });
        }
    }

    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);

    if bars.is_empty() {
        return Err("no price data returned".to_string());
    }
    Ok(bars)
}
