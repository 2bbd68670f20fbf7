use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PredictionError;
use crate::types::{Bar, BarSeries};

/// Number of lagged daily returns fed to the model
pub const NUM_LAGS: usize = 5;
/// Trailing window of the close moving average
pub const MA_WINDOW: usize = 10;
/// Closed sessions needed before the first row is fully defined
pub const MIN_CLOSED_SESSIONS: usize = MA_WINDOW + 1;

const VOLUME_SCALE: f64 = 1_000_000_000.0;

/// Model input, in the column order the classifier was trained on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub volume_billions: f64,
    pub lag_1: f64,
    pub lag_2: f64,
    pub lag_3: f64,
    pub lag_4: f64,
    pub lag_5: f64,
    pub dist_ma10: f64,
}

impl FeatureVector {
    pub const NUM_FEATURES: usize = 7;

    pub fn to_array(&self) -> [f64; Self::NUM_FEATURES] {
        [
            self.volume_billions,
            self.lag_1,
            self.lag_2,
            self.lag_3,
            self.lag_4,
            self.lag_5,
            self.dist_ma10,
        ]
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.to_array().iter().map(|&v| v as f32).collect()
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// Derived record for one trading day whose inputs are all defined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub close: f64,
    pub today_return: f64,
    pub lag_1: f64,
    pub lag_2: f64,
    pub lag_3: f64,
    pub lag_4: f64,
    pub lag_5: f64,
    pub volume_billions: f64,
    pub dist_ma10: f64,
    /// 1 when the session closed up, kept for offline evaluation only
    pub target: u8,
}

impl FeatureRow {
    pub fn vector(&self) -> FeatureVector {
        FeatureVector {
            volume_billions: self.volume_billions,
            lag_1: self.lag_1,
            lag_2: self.lag_2,
            lag_3: self.lag_3,
            lag_4: self.lag_4,
            lag_5: self.lag_5,
            dist_ma10: self.dist_ma10,
        }
    }
}

/// Output of a successful build
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltFeatures {
    pub vector: FeatureVector,
    pub last_close: f64,
    /// Date of the row the vector came from
    pub date: NaiveDate,
}

/// Turns raw daily bars into the latest fully defined feature row.
#[derive(Debug, Clone, Copy)]
pub struct FeatureBuilder {
    last_closed: NaiveDate,
}

impl FeatureBuilder {
    /// `last_closed` is the newest session whose close is final, normally yesterday.
    pub fn new(last_closed: NaiveDate) -> Self {
        Self { last_closed }
    }

    pub fn series(&self, ticker: &str, raw: Vec<Bar>) -> BarSeries {
        BarSeries::from_raw(ticker, raw, self.last_closed)
    }

    pub fn build(&self, ticker: &str, raw: Vec<Bar>) -> Result<BuiltFeatures, PredictionError> {
        let series = self.series(ticker, raw);
        build_latest(&series)
    }
}

/// Selects the most recent eligible row of a normalized series.
pub fn build_latest(series: &BarSeries) -> Result<BuiltFeatures, PredictionError> {
    let rows = feature_rows(series);

    let latest = rows.iter().max_by_key(|r| r.date).ok_or_else(|| {
        PredictionError::InsufficientHistory {
            ticker: series.ticker().to_string(),
            closed_sessions: series.len(),
            required: MIN_CLOSED_SESSIONS,
        }
    })?;

    debug!(
        "Features for {} built from {} closed sessions, selected {}",
        series.ticker(),
        series.len(),
        latest.date
    );

    Ok(BuiltFeatures {
        vector: latest.vector(),
        last_close: latest.close,
        date: latest.date,
    })
}

/// Every eligible row of the series, oldest first.
pub fn feature_rows(series: &BarSeries) -> Vec<FeatureRow> {
    let bars = series.bars();
    let closes = series.closes();
    let returns = daily_returns(&closes);
    let ma = rolling_mean(&closes, MA_WINDOW);

    let mut rows = Vec::new();
    for t in 0..bars.len() {
        let Some(row) = build_row(bars, &returns, &ma, t) else {
            continue;
        };
        if row_is_finite(&row) {
            rows.push(row);
        }
    }
    rows
}

fn build_row(bars: &[Bar], returns: &[Option<f64>], ma: &[Option<f64>], t: usize) -> Option<FeatureRow> {
    let today_return = returns[t]?;
    let lag = |k: usize| -> Option<f64> { t.checked_sub(k).and_then(|i| returns[i]) };

    let ma_now = ma[t]?;
    let ma_prev = ma[t.checked_sub(1)?]?;
    let close = bars[t].close;

    Some(FeatureRow {
        date: bars[t].date,
        close,
        today_return,
        lag_1: lag(1)?,
        lag_2: lag(2)?,
        lag_3: lag(3)?,
        lag_4: lag(4)?,
        lag_5: lag(NUM_LAGS)?,
        volume_billions: bars[t].volume / VOLUME_SCALE,
        dist_ma10: (close - ma_now) / ma_prev,
        target: if today_return > 0.0 { 1 } else { 0 },
    })
}

fn row_is_finite(row: &FeatureRow) -> bool {
    row.today_return.is_finite() && row.vector().is_finite()
}

/// Percentage change between consecutive closes; the first entry has no predecessor.
pub fn daily_returns(closes: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(closes.len());
    for (i, close) in closes.iter().enumerate() {
        if i == 0 {
            out.push(None);
        } else {
            let prev = closes[i - 1];
            out.push(Some((close - prev) / prev * 100.0));
        }
    }
    out
}

/// Trailing simple moving average, undefined until `period` values exist.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                let window = &values[i + 1 - period..=i];
                Some(window.iter().sum::<f64>() / period as f64)
            }
        })
        .collect()
}
