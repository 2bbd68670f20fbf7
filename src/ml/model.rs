use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::PredictionError;

/// Classifier output for a single feature vector
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub label: i64,
    pub probabilities: BTreeMap<i64, f64>,
}

impl Score {
    /// Builds a score from per-class probabilities, such as the
    /// `seq(map(int64, float))` output of a zipmapped sklearn export.
    ///
    /// Without a reported label the most probable class wins; ties go to the lower class.
    pub fn from_class_probabilities(label: Option<i64>, probabilities: impl IntoIterator<Item = (i64, f32)>) -> Self {
        let probabilities: BTreeMap<i64, f64> = probabilities
            .into_iter()
            .map(|(class, p)| (class, f64::from(p)))
            .collect();

        let label = label.unwrap_or_else(|| {
            probabilities
                .iter()
                .rev()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map_or(0, |(&class, _)| class)
        });

        Self { label, probabilities }
    }

    /// Probability of the most likely class
    pub fn confidence(&self) -> f64 {
        self.probabilities.values().copied().fold(0.0, f64::max)
    }

    /// Checks the binary classifier contract: classes 0 and 1, each in [0, 1], summing to 1.
    pub fn validate(&self) -> Result<(), PredictionError> {
        if self.label != 0 && self.label != 1 {
            return Err(PredictionError::ScoringFailure(format!("unexpected label {}", self.label)));
        }
        if !self.probabilities.contains_key(&0) || !self.probabilities.contains_key(&1) {
            return Err(PredictionError::ScoringFailure(format!(
                "expected probabilities for classes 0 and 1, got {:?}",
                self.probabilities.keys().collect::<Vec<_>>()
            )));
        }
        if self.probabilities.values().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(PredictionError::ScoringFailure("probability outside [0, 1]".to_string()));
        }
        let total: f64 = self.probabilities.values().sum();
        if (total - 1.0).abs() > 1e-4 {
            return Err(PredictionError::ScoringFailure(format!(
                "class probabilities sum to {total:.6}"
            )));
        }
        Ok(())
    }
}

/// A loaded binary classifier. Implementations must be safe to share across requests.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    /// Width of the input row the model was trained on
    fn num_features(&self) -> usize;

    fn predict(&self, input: &[f32]) -> Result<Score, PredictionError>;
}

/// Logistic regression coefficients as exported by the training job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelWeights {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub feature_means: Option<Vec<f64>>,
    #[serde(default)]
    pub feature_stds: Option<Vec<f64>>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    0.5
}

/// Logistic regression classifier loaded from a JSON weights artifact
pub struct LogisticModel {
    coefficients: Array1<f64>,
    intercept: f64,
    means: Option<Array1<f64>>,
    stds: Option<Array1<f64>>,
    threshold: f64,
    name: String,
}

impl LogisticModel {
    pub fn from_weights(weights: ModelWeights, name: &str) -> Result<Self, PredictionError> {
        let n = weights.coefficients.len();
        if n == 0 {
            return Err(PredictionError::ArtifactUnavailable("model has no coefficients".to_string()));
        }
        for (label, column) in [("feature_means", &weights.feature_means), ("feature_stds", &weights.feature_stds)] {
            if let Some(values) = column {
                if values.len() != n {
                    return Err(PredictionError::ArtifactUnavailable(format!(
                        "{label} has {} entries, expected {n}",
                        values.len()
                    )));
                }
            }
        }
        if !(0.0..=1.0).contains(&weights.threshold) {
            return Err(PredictionError::ArtifactUnavailable(format!(
                "threshold {} outside [0, 1]",
                weights.threshold
            )));
        }

        Ok(Self {
            coefficients: Array1::from(weights.coefficients),
            intercept: weights.intercept,
            means: weights.feature_means.map(Array1::from),
            stds: weights.feature_stds.map(Array1::from),
            threshold: weights.threshold,
            name: name.to_string(),
        })
    }

    pub fn load_from_json(json: &str, name: &str) -> Result<Self, PredictionError> {
        let weights: ModelWeights = serde_json::from_str(json)
            .map_err(|e| PredictionError::ArtifactUnavailable(format!("invalid model weights: {e}")))?;
        Self::from_weights(weights, name)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PredictionError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PredictionError::ArtifactUnavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("logistic");

        let model = Self::load_from_json(&json, name)?;
        info!("Loaded logistic model '{}' with {} features", model.name, model.num_features());
        Ok(model)
    }

    fn standardize(&self, x: ArrayView1<f64>) -> Array1<f64> {
        match (&self.means, &self.stds) {
            (Some(means), Some(stds)) => {
                let mut out = &x - means;
                for (v, std) in out.iter_mut().zip(stds.iter()) {
                    *v = if *std > 1e-10 { *v / std } else { 0.0 };
                }
                out
            }
            _ => x.to_owned(),
        }
    }
}

impl Classifier for LogisticModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict(&self, input: &[f32]) -> Result<Score, PredictionError> {
        if input.len() != self.num_features() {
            return Err(PredictionError::ScoringFailure(format!(
                "model '{}' expects {} features, got {}",
                self.name,
                self.num_features(),
                input.len()
            )));
        }

        let x: Array1<f64> = input.iter().map(|&v| v as f64).collect();
        let z = self.intercept + self.coefficients.dot(&self.standardize(x.view()));
        let p_up = sigmoid(z);

        debug!("Logistic score z={:.6}, p(up)={:.4}", z, p_up);

        let label = if p_up >= self.threshold { 1 } else { 0 };
        Ok(Score {
            label,
            probabilities: BTreeMap::from([(0, 1.0 - p_up), (1, p_up)]),
        })
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
