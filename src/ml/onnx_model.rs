use ort::value::{DynValue, DynValueTypeMarker};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use super::features::FeatureVector;
use super::model::{Classifier, Score};
use crate::error::PredictionError;

/// ONNX classifier wrapper for inference using ONNX Runtime.
///
/// Expects the sklearn/xgboost export layout: output 0 is the predicted
/// label, output 1 the class probabilities, either as a `[batch, n_classes]`
/// tensor or, for zipmapped exports, a sequence of class -> probability maps.
pub struct OnnxModel {
    // Runtime sessions need exclusive access per run
    session: Mutex<ort::session::Session>,
    name: String,
}

impl OnnxModel {
    pub fn load(path: impl AsRef<Path>, name: &str) -> Result<Self, PredictionError> {
        let path = path.as_ref();
        let build = || -> anyhow::Result<ort::session::Session> {
            Ok(ort::session::Session::builder()?
                .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
                .commit_from_file(path)?)
        };
        let session = build().map_err(|e| {
            PredictionError::ArtifactUnavailable(format!("cannot load {}: {e}", path.display()))
        })?;

        info!("Loaded ONNX model '{}' from {}", name, path.display());

        Ok(Self {
            session: Mutex::new(session),
            name: name.to_string(),
        })
    }
}

fn scoring(e: impl std::fmt::Display) -> PredictionError {
    PredictionError::ScoringFailure(e.to_string())
}

/// Class probabilities of the first batch row
fn class_probabilities(output: &DynValue) -> Result<Vec<(i64, f32)>, PredictionError> {
    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let dims = &**shape;
        if dims.len() != 2 || dims[1] != 2 {
            return Err(PredictionError::ScoringFailure(format!(
                "probability tensor has shape {dims:?}, expected [1, 2]"
            )));
        }
        return Ok(data.iter().take(2).enumerate().map(|(class, &p)| (class as i64, p)).collect());
    }

    // ZipMap output: seq(map(int64, float)), one map per batch row
    let allocator = ort::memory::Allocator::default();
    let rows = output
        .try_extract_sequence::<DynValueTypeMarker>(&allocator)
        .map_err(scoring)?;
    let first = rows
        .first()
        .ok_or_else(|| PredictionError::ScoringFailure("empty probability sequence".to_string()))?;
    let map = first.try_extract_map::<i64, f32>().map_err(scoring)?;
    Ok(map.into_iter().collect())
}

impl Classifier for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_features(&self) -> usize {
        FeatureVector::NUM_FEATURES
    }

    fn predict(&self, input: &[f32]) -> Result<Score, PredictionError> {
        let tensor = ort::value::Tensor::from_array(([1usize, input.len()], input.to_vec().into_boxed_slice()))
            .map_err(scoring)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| PredictionError::ScoringFailure("model session poisoned".to_string()))?;
        let outputs = session.run(ort::inputs![tensor]).map_err(scoring)?;

        if outputs.len() < 2 {
            return Err(PredictionError::ScoringFailure(format!(
                "model '{}' returned {} outputs, expected label and probabilities",
                self.name,
                outputs.len()
            )));
        }

        let probabilities = class_probabilities(&outputs[1])?;
        let label = match outputs[0].try_extract_tensor::<i64>() {
            Ok((_, labels)) => labels.first().copied(),
            Err(_) => None,
        };

        Ok(Score::from_class_probabilities(label, probabilities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_onnx_model_missing_file() {
        let result = OnnxModel::load("/nonexistent/model.onnx", "test");
        assert!(matches!(result, Err(PredictionError::ArtifactUnavailable(_))));
    }
}
