use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info};

use super::MarketDataSource;
use crate::error::PredictionError;
use crate::types::Bar;

pub const YAHOO_CHART_API: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

const USER_AGENT: &str = "Mozilla/5.0 (compatible; stock-direction-forecaster/0.1)";

/// Daily bars from the Yahoo Finance chart endpoint
pub struct YahooFinanceClient {
    client: Client,
    base_url: Url,
    limiter: DefaultDirectRateLimiter,
}

impl YahooFinanceClient {
    pub fn new(base_url: &str, timeout: Duration, requests_per_second: u32) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);

        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("chart API URL {} cannot carry a path", base_url);
        }

        Ok(Self {
            client,
            base_url,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        })
    }

    /// Chart endpoint for one ticker; the ticker is percent-encoded as a single path segment
    fn chart_url(&self, ticker: &str) -> Result<Url, PredictionError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PredictionError::data_unavailable(ticker, "chart API URL cannot carry a path"))?
            .pop_if_empty()
            .push(ticker);
        Ok(url)
    }
}

#[async_trait]
impl MarketDataSource for YahooFinanceClient {
    async fn fetch(&self, ticker: &str, lookback_days: u32) -> Result<Vec<Bar>, PredictionError> {
        self.limiter.until_ready().await;

        let now = Utc::now();
        let start = now - chrono::Duration::days(i64::from(lookback_days));
        let query = [
            ("period1", start.timestamp().to_string()),
            ("period2", now.timestamp().to_string()),
            ("interval", "1d".to_string()),
            ("events", "history".to_string()),
        ];

        let url = self.chart_url(ticker)?;
        info!("Downloading stock market data for {}", ticker);

        let response = self
            .client
            .get(url)
            .query(&query)
            .send()
            .await
            .map_err(|e| PredictionError::data_unavailable(ticker, e))?;

        let status = response.status();
        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| PredictionError::data_unavailable(ticker, format!("status {status}: {e}")))?;

        let bars = parse_chart(ticker, body)?;
        debug!("Received {} daily bars for {}", bars.len(), ticker);
        Ok(bars)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    pub chart: Chart,
}

#[derive(Debug, Deserialize)]
pub struct Chart {
    pub result: Option<Vec<ChartResult>>,
    pub error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
pub struct ChartError {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ChartResult {
    pub meta: ChartMeta,
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    pub symbol: String,
    /// Exchange offset from UTC in seconds
    #[serde(default)]
    pub gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
pub struct Indicators {
    pub quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Quote {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}

/// Converts a chart payload into bars, skipping rows with any missing field.
///
/// Dates are taken in the exchange's own timezone.
pub fn parse_chart(ticker: &str, body: ChartResponse) -> Result<Vec<Bar>, PredictionError> {
    if let Some(err) = body.chart.error {
        return Err(PredictionError::data_unavailable(
            ticker,
            format!("{}: {}", err.code, err.description),
        ));
    }

    let result = body
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| PredictionError::data_unavailable(ticker, "empty chart result"))?;

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let symbol = result.meta.symbol.to_ascii_uppercase();
    let offset = result.meta.gmtoffset;

    let bars: Vec<Bar> = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let date = DateTime::from_timestamp(ts + offset, 0)?.date_naive();
            Some(Bar {
                ticker: symbol.clone(),
                date,
                open: value_at(&quote.open, i)?,
                high: value_at(&quote.high, i)?,
                low: value_at(&quote.low, i)?,
                close: value_at(&quote.close, i)?,
                volume: value_at(&quote.volume, i)?,
            })
        })
        .collect();

    if bars.is_empty() {
        return Err(PredictionError::data_unavailable(ticker, "no rows returned"));
    }
    Ok(bars)
}

fn value_at(values: &[Option<f64>], i: usize) -> Option<f64> {
    values.get(i).copied().flatten()
}
