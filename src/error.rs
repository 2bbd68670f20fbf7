use thiserror::Error;

/// Every way a single prediction can fail.
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("invalid ticker: {0:?}")]
    InvalidTicker(String),

    /// Market data could not be fetched, timed out, or came back empty
    #[error("no market data available for {ticker}: {reason}")]
    DataUnavailable { ticker: String, reason: String },

    /// No feature row survived derivation: too few closed sessions, or every
    /// candidate row touched an unusable close
    #[error(
        "insufficient history for {ticker}: {closed_sessions} closed sessions gave no fully defined feature row \
         (a row needs {required} consecutive sessions with usable closes)"
    )]
    InsufficientHistory {
        ticker: String,
        closed_sessions: usize,
        required: usize,
    },

    #[error("model artifact unavailable: {0}")]
    ArtifactUnavailable(String),

    /// Feature vector and model disagree; a bug, not a data problem
    #[error("scoring failed: {0}")]
    ScoringFailure(String),
}

impl PredictionError {
    pub fn data_unavailable(ticker: &str, reason: impl ToString) -> Self {
        PredictionError::DataUnavailable {
            ticker: ticker.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for failures caused by upstream data, false for model and contract failures.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            PredictionError::InvalidTicker(_)
                | PredictionError::DataUnavailable { .. }
                | PredictionError::InsufficientHistory { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PredictionError::InvalidTicker(_) => "invalid_ticker",
            PredictionError::DataUnavailable { .. } => "data_unavailable",
            PredictionError::InsufficientHistory { .. } => "insufficient_history",
            PredictionError::ArtifactUnavailable(_) => "artifact_unavailable",
            PredictionError::ScoringFailure(_) => "scoring_failure",
        }
    }
}
