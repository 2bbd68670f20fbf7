pub mod yahoo;

pub use yahoo::*;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::PredictionError;
use crate::types::Bar;

/// Supplier of raw daily bars for one ticker.
///
/// Rows may arrive unsorted, with duplicate dates, and may include the
/// still-open session; normalization happens in the feature builder.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch(&self, ticker: &str, lookback_days: u32) -> Result<Vec<Bar>, PredictionError>;
}

/// In-memory bars keyed by upper-case ticker, e.g. loaded from a JSON file
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    bars: HashMap<String, Vec<Bar>>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bars(bars: Vec<Bar>) -> Self {
        let mut data = Self::new();
        for bar in bars {
            data.bars.entry(bar.ticker.to_ascii_uppercase()).or_default().push(bar);
        }
        data
    }

    pub fn with_ticker(mut self, ticker: &str, bars: Vec<Bar>) -> Self {
        self.bars.insert(ticker.to_ascii_uppercase(), bars);
        self
    }

    pub fn load_json(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let bars: Vec<Bar> = serde_json::from_str(&raw)?;
        Ok(Self::from_bars(bars))
    }
}

#[async_trait]
impl MarketDataSource for StaticMarketData {
    async fn fetch(&self, ticker: &str, _lookback_days: u32) -> Result<Vec<Bar>, PredictionError> {
        match self.bars.get(&ticker.to_ascii_uppercase()) {
            Some(bars) if !bars.is_empty() => Ok(bars.clone()),
            _ => Err(PredictionError::data_unavailable(ticker, "no rows returned")),
        }
    }
}
