use tracing::{debug, info};

use super::features::FeatureVector;
use super::model::{Classifier, Score};
use crate::error::PredictionError;

/// Process-lifetime owner of the loaded classifier.
///
/// Created once before serving and shared read-only behind an `Arc`;
/// dropping it releases the model.
pub struct ModelSession {
    classifier: Box<dyn Classifier>,
    source: String,
}

impl ModelSession {
    pub fn new(classifier: Box<dyn Classifier>, source: impl Into<String>) -> Self {
        let source = source.into();
        info!("Model session built from {} ({})", source, classifier.name());
        Self { classifier, source }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn model_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn score(&self, vector: &FeatureVector) -> Result<Score, PredictionError> {
        if !vector.is_finite() {
            return Err(PredictionError::ScoringFailure(format!(
                "non-finite feature vector {:?}",
                vector.to_array()
            )));
        }
        let expected = self.classifier.num_features();
        if expected != FeatureVector::NUM_FEATURES {
            return Err(PredictionError::ScoringFailure(format!(
                "model '{}' expects {} features, feature vector has {}",
                self.classifier.name(),
                expected,
                FeatureVector::NUM_FEATURES
            )));
        }

        let score = self.classifier.predict(&vector.to_f32())?;
        score.validate()?;

        debug!("Scored with '{}': label={} confidence={:.4}", self.classifier.name(), score.label, score.confidence());
        Ok(score)
    }
}

impl Drop for ModelSession {
    fn drop(&mut self) {
        info!("Model session for {} released", self.source);
    }
}
