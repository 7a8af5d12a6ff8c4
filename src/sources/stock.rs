//! Stock data: fetched from the Yahoo chart API or loaded from a saved file.
//!
//! Both paths produce the same [`StockData`] shape and both are validated
//! the same way. Stock data is the one input the pipeline cannot run
//! without, so every failure here is returned to the caller.

use crate::error::{StockDataError, ValidationError};
use crate::models::{DailyBar, StockData, StockInfo};
use crate::utils::write_atomic;
use chrono::DateTime;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_CHART_ENDPOINT: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// History ranges the chart API accepts.
pub const VALID_PERIODS: [&str; 11] = [
    "1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "ytd", "max",
];

pub fn validate_period(period: &str) -> Result<(), StockDataError> {
    if VALID_PERIODS.contains(&period) {
        Ok(())
    } else {
        Err(StockDataError::InvalidPeriod(period.to_string()))
    }
}

/// Reject stock data that cannot support a report.
pub fn validate_stock_data(data: &StockData) -> Result<(), ValidationError> {
    if data.history.is_empty() {
        return Err(ValidationError::EmptyStockData);
    }
    Ok(())
}

/// Load `<TICKER>_stock_data.json` (or any file of the same shape).
///
/// Both the `info` and `history` keys must be present.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_stock_data(path: &Path) -> Result<StockData, StockDataError> {
    let raw = tokio::fs::read(path).await?;
    let value: Value = serde_json::from_slice(&raw)?;
    for key in ["info", "history"] {
        if value.get(key).is_none() {
            return Err(ValidationError::MissingKey(key).into());
        }
    }
    let data: StockData = serde_json::from_value(value)?;
    validate_stock_data(&data)?;
    info!(rows = data.history.len(), "Loaded stock data from file");
    Ok(data)
}

/// Persist stock data as pretty JSON.
pub async fn save_stock_data(data: &StockData, path: &Path) -> Result<(), StockDataError> {
    let bytes = serde_json::to_vec_pretty(data)?;
    write_atomic(path, &bytes).await?;
    info!(path = %path.display(), "Saved stock data");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ChartMeta {
    symbol: String,
    long_name: Option<String>,
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_volume: Option<u64>,
    fifty_two_week_low: Option<f64>,
    fifty_two_week_high: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteSeries {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

impl ChartResult {
    fn into_stock_data(self) -> StockData {
        let meta = self.meta;
        let info = StockInfo {
            symbol: meta.symbol,
            long_name: meta.long_name,
            current_price: meta.regular_market_price,
            previous_close: meta.chart_previous_close,
            day_low: meta.regular_market_day_low,
            day_high: meta.regular_market_day_high,
            volume: meta.regular_market_volume,
            market_cap: None,
            trailing_pe: None,
            fifty_two_week_low: meta.fifty_two_week_low,
            fifty_two_week_high: meta.fifty_two_week_high,
        };

        let quote = self.indicators.quote.into_iter().next().unwrap_or_default();
        let at = |v: &[Option<f64>], i: usize| v.get(i).copied().flatten();
        let history = self
            .timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, &ts)| {
                let date = DateTime::from_timestamp(ts, 0)?.format("%Y-%m-%d").to_string();
                Some(DailyBar {
                    date,
                    open: at(&quote.open, i),
                    high: at(&quote.high, i),
                    low: at(&quote.low, i),
                    close: at(&quote.close, i),
                    volume: quote.volume.get(i).copied().flatten(),
                })
            })
            .collect();

        StockData { info, history }
    }
}

/// Client for the public chart endpoint.
#[derive(Debug, Clone)]
pub struct YahooChartClient {
    http: reqwest::Client,
    endpoint: String,
}

impl YahooChartClient {
    pub fn new(timeout: Duration) -> Result<Self, StockDataError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("stock_brief/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: DEFAULT_CHART_ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    /// Fetch quote info and daily bars for `ticker` over `period`.
    #[instrument(level = "info", skip_all, fields(%ticker, %period))]
    pub async fn fetch(&self, ticker: &str, period: &str) -> Result<StockData, StockDataError> {
        validate_period(period)?;
        let url = format!("{}/{}", self.endpoint, urlencoding::encode(ticker));
        let resp = self
            .http
            .get(&url)
            .query(&[("range", period), ("interval", "1d")])
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(StockDataError::Status(status));
        }
        let envelope: ChartEnvelope = resp.json().await?;
        let result = envelope
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| StockDataError::NoResult(ticker.to_string()))?;

        let data = result.into_stock_data();
        validate_stock_data(&data)?;
        info!(
            rows = data.history.len(),
            price = ?data.info.current_price,
            "Fetched stock data"
        );
        Ok(data)
    }
}
