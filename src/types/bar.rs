use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One daily OHLCV record for a ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Date-ordered, duplicate-free daily bars for a single ticker.
///
/// Only sessions dated on or before `last_closed` survive construction, so
/// a still-open session never leaks into the features.
#[derive(Debug, Clone, Default)]
pub struct BarSeries {
    ticker: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Builds a series from raw provider rows.
    ///
    /// Duplicate dates keep the first-seen bar in input order. Bars for other
    /// tickers are ignored.
    pub fn from_raw(ticker: &str, raw: Vec<Bar>, last_closed: NaiveDate) -> Self {
        let mut seen = HashSet::new();
        let mut bars: Vec<Bar> = raw
            .into_iter()
            .filter(|b| b.ticker.eq_ignore_ascii_case(ticker))
            .filter(|b| seen.insert(b.date))
            .filter(|b| b.date <= last_closed)
            .collect();

        bars.sort_by_key(|b| b.date);

        Self {
            ticker: ticker.to_string(),
            bars,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}
