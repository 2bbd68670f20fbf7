use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::error::PredictionError;
use crate::market_data::MarketDataSource;
use crate::ml::{FeatureBuilder, ModelSession};
use crate::types::{Direction, PredictionResult};

/// Composes market data, feature construction and model scoring for one ticker.
///
/// Holds no per-request state; clones share the same model session.
#[derive(Clone)]
pub struct PredictionService {
    source: Arc<dyn MarketDataSource>,
    session: Arc<ModelSession>,
    clock: Arc<dyn Clock>,
    lookback_days: u32,
    fetch_timeout: Duration,
}

impl PredictionService {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        session: Arc<ModelSession>,
        clock: Arc<dyn Clock>,
        lookback_days: u32,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            session,
            clock,
            lookback_days,
            fetch_timeout,
        }
    }

    pub async fn predict(&self, ticker: &str) -> Result<PredictionResult, PredictionError> {
        let result = self.run(ticker).await;

        if let Err(e) = &result {
            if e.is_data_error() {
                warn!("Prediction for {} failed: {}", ticker, e);
            } else {
                error!("Prediction for {} failed ({}): {}", ticker, e.kind(), e);
            }
        }
        result
    }

    async fn run(&self, ticker: &str) -> Result<PredictionResult, PredictionError> {
        let ticker = normalize_ticker(ticker)?;
        info!("Predicting outcome for {}", ticker);

        let today = self.clock.today();
        let builder = FeatureBuilder::new(self.clock.yesterday());

        let raw = tokio::time::timeout(self.fetch_timeout, self.source.fetch(&ticker, self.lookback_days))
            .await
            .map_err(|_| {
                PredictionError::data_unavailable(
                    &ticker,
                    format!("market data request timed out after {:?}", self.fetch_timeout),
                )
            })??;

        if raw.is_empty() {
            return Err(PredictionError::data_unavailable(&ticker, "no rows returned"));
        }

        let built = builder.build(&ticker, raw)?;
        info!("Features builder concluded for {} using session {}", ticker, built.date);

        let score = self.session.score(&built.vector)?;

        Ok(PredictionResult {
            ticker,
            reference_date: built.date,
            forecast_date: today,
            last_close: built.last_close,
            label: Direction::from_label(score.label),
            probability: score.confidence(),
        })
    }
}

/// Canonical ticker form: trimmed and upper-cased.
///
/// Accepts letters, digits and `. ^ = -` (`BRK-B`, `^GSPC`, `EURUSD=X`) with
/// at least one letter or digit.
pub fn normalize_ticker(ticker: &str) -> Result<String, PredictionError> {
    let ticker = ticker.trim().to_ascii_uppercase();
    let allowed = |c: char| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '^' | '=' | '-');

    if !ticker.chars().all(allowed) || !ticker.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(PredictionError::InvalidTicker(ticker));
    }
    Ok(ticker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::market_data::MockMarketDataSource;
    use crate::ml::{Classifier, LogisticModel, ModelWeights, Score};
    use crate::types::Bar;
    use chrono::{Days, NaiveDate};
    use std::collections::BTreeMap;

    const CLOSES: [f64; 12] = [100.0, 101.0, 99.0, 102.0, 103.0, 101.0, 104.0, 105.0, 103.0, 106.0, 108.0, 107.0];

    const NVDA_CLOSES: [f64; 12] = [50.0, 52.0, 51.0, 55.0, 54.0, 58.0, 57.0, 60.0, 62.0, 61.0, 64.0, 66.0];

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
    }

    /// Clock whose "yesterday" is the 12th trading day
    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::new(start() + Days::new(12)))
    }

    fn bars(ticker: &str, closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                ticker: ticker.to_string(),
                date: start() + Days::new(i as u64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 2_000_000_000.0,
            })
            .collect()
    }

    fn weighted_session(coefficients: Vec<f64>, intercept: f64) -> Arc<ModelSession> {
        let model = LogisticModel::from_weights(
            ModelWeights {
                coefficients,
                intercept,
                feature_means: None,
                feature_stds: None,
                threshold: 0.5,
            },
            "memory",
        )
        .unwrap();
        Arc::new(ModelSession::new(Box::new(model), "memory"))
    }

    fn session(intercept: f64) -> Arc<ModelSession> {
        weighted_session(vec![0.0; 7], intercept)
    }

    fn service(source: MockMarketDataSource, session: Arc<ModelSession>) -> PredictionService {
        PredictionService::new(Arc::new(source), session, clock(), 31, Duration::from_secs(5))
    }

    #[test]
    fn test_normalize_ticker() {
        assert_eq!(normalize_ticker(" aapl ").unwrap(), "AAPL");
        assert_eq!(normalize_ticker("brk-b").unwrap(), "BRK-B");
        assert_eq!(normalize_ticker("^gspc").unwrap(), "^GSPC");
        assert_eq!(normalize_ticker("eurusd=x").unwrap(), "EURUSD=X");
        assert!(normalize_ticker("   ").is_err());
        assert!(normalize_ticker("AA PL").is_err());
    }

    #[test]
    fn test_normalize_ticker_rejects_url_syntax() {
        for raw in ["aapl?range=5y", "../v7/quote", "a#b", "AAPL/", "..", "a%2Fb", "ÄPPLE"] {
            let err = normalize_ticker(raw).unwrap_err();
            assert!(matches!(err, PredictionError::InvalidTicker(_)), "{raw} accepted");
        }
    }

    #[tokio::test]
    async fn test_url_like_ticker_skips_fetch() {
        let mut source = MockMarketDataSource::new();
        source.expect_fetch().times(0);

        let err = service(source, session(0.0)).predict("aapl?range=5y").await.unwrap_err();
        assert!(matches!(err, PredictionError::InvalidTicker(_)));
    }

    #[tokio::test]
    async fn test_predict_end_to_end() {
        let mut source = MockMarketDataSource::new();
        source
            .expect_fetch()
            .withf(|ticker, lookback| ticker == "AAPL" && *lookback == 31)
            .times(1)
            .returning(|ticker, _| Ok(bars(ticker, &CLOSES)));

        let result = service(source, session(1.0)).predict("aapl").await.unwrap();

        assert_eq!(result.ticker, "AAPL");
        assert_eq!(result.last_close, 107.0);
        assert_eq!(result.label, Direction::Up);
        assert_eq!(result.reference_date, start() + Days::new(11));
        assert_eq!(result.forecast_date, start() + Days::new(12));
        assert!((result.probability - 1.0 / (1.0 + (-1.0f64).exp())).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_down_label_reports_down_confidence() {
        let mut source = MockMarketDataSource::new();
        source.expect_fetch().returning(|ticker, _| Ok(bars(ticker, &CLOSES)));

        let result = service(source, session(-2.0)).predict("MSFT").await.unwrap();

        assert_eq!(result.label, Direction::Down);
        assert!(result.probability > 0.5);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_data_unavailable() {
        let mut source = MockMarketDataSource::new();
        source
            .expect_fetch()
            .returning(|ticker, _| Err(PredictionError::data_unavailable(ticker, "connection refused")));

        let err = service(source, session(0.0)).predict("AAPL").await.unwrap_err();
        assert!(matches!(err, PredictionError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_empty_fetch_is_data_unavailable() {
        let mut source = MockMarketDataSource::new();
        source.expect_fetch().returning(|_, _| Ok(Vec::new()));

        let err = service(source, session(0.0)).predict("AAPL").await.unwrap_err();
        assert!(matches!(err, PredictionError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_short_history_is_insufficient() {
        let mut source = MockMarketDataSource::new();
        source.expect_fetch().returning(|ticker, _| Ok(bars(ticker, &CLOSES[..8])));

        let err = service(source, session(0.0)).predict("NEWCO").await.unwrap_err();
        assert!(matches!(err, PredictionError::InsufficientHistory { closed_sessions: 8, .. }));
    }

    #[tokio::test]
    async fn test_invalid_ticker_skips_fetch() {
        let mut source = MockMarketDataSource::new();
        source.expect_fetch().times(0);

        let err = service(source, session(0.0)).predict("  ").await.unwrap_err();
        assert!(matches!(err, PredictionError::InvalidTicker(_)));
    }

    struct SlowSource;

    #[async_trait::async_trait]
    impl MarketDataSource for SlowSource {
        async fn fetch(&self, _ticker: &str, _lookback_days: u32) -> Result<Vec<Bar>, PredictionError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out() {
        let service = PredictionService::new(Arc::new(SlowSource), session(0.0), clock(), 31, Duration::from_secs(2));

        let err = service.predict("AAPL").await.unwrap_err();
        assert!(matches!(err, PredictionError::DataUnavailable { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    struct BrokenClassifier;

    impl Classifier for BrokenClassifier {
        fn name(&self) -> &str {
            "broken"
        }

        fn num_features(&self) -> usize {
            7
        }

        fn predict(&self, _input: &[f32]) -> Result<Score, PredictionError> {
            Ok(Score {
                label: 3,
                probabilities: BTreeMap::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_scoring_failure_is_not_a_data_error() {
        let mut source = MockMarketDataSource::new();
        source.expect_fetch().returning(|ticker, _| Ok(bars(ticker, &CLOSES)));
        let broken = Arc::new(ModelSession::new(Box::new(BrokenClassifier), "memory"));

        let err = service(source, broken).predict("AAPL").await.unwrap_err();
        assert!(matches!(err, PredictionError::ScoringFailure(_)));
        assert!(!err.is_data_error());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_predictions_do_not_interfere() {
        let mut source = MockMarketDataSource::new();
        source.expect_fetch().returning(|ticker, _| {
            let closes: &[f64] = if ticker == "AAPL" { &CLOSES } else { &NVDA_CLOSES };
            Ok(bars(ticker, closes))
        });
        let service = service(source, weighted_session(vec![0.1, 0.4, -0.3, 0.2, 0.1, -0.2, 8.0], -0.2));

        let sequential_a = service.predict("AAPL").await.unwrap();
        let sequential_b = service.predict("NVDA").await.unwrap();

        let (a, b) = {
            let sa = service.clone();
            let sb = service.clone();
            let ha = tokio::spawn(async move { sa.predict("aapl").await });
            let hb = tokio::spawn(async move { sb.predict("nvda").await });
            (ha.await.unwrap().unwrap(), hb.await.unwrap().unwrap())
        };

        assert_eq!(a, sequential_a);
        assert_eq!(b, sequential_b);
        assert_eq!(a.last_close, 107.0);
        assert_eq!(b.last_close, 66.0);
        assert!((a.probability - b.probability).abs() > 1e-3);
        assert_eq!(a.label, Direction::Down);
        assert_eq!(b.label, Direction::Up);
    }
}
