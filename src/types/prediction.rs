use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Maps a classifier label onto a direction. Anything but 1 is DOWN.
    pub fn from_label(label: i64) -> Self {
        if label == 1 {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub ticker: String,
    /// Closed session whose features were scored
    pub reference_date: NaiveDate,
    /// Session whose close is being forecast
    pub forecast_date: NaiveDate,
    pub last_close: f64,
    pub label: Direction,
    /// Confidence of the predicted class, in [0, 1]
    pub probability: f64,
}
