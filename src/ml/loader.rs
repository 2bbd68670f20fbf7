use reqwest::{Client, Url};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::model::{Classifier, LogisticModel};
use super::session::ModelSession;
use crate::error::PredictionError;

/// Serialized classifier formats understood by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Logistic regression weights as JSON
    Json,
    Onnx,
}

impl ArtifactFormat {
    pub fn from_location(location: &str) -> Result<Self, PredictionError> {
        let path = location.split(['?', '#']).next().unwrap_or(location);
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("json") => Ok(ArtifactFormat::Json),
            Some("onnx") => Ok(ArtifactFormat::Onnx),
            _ => Err(PredictionError::ArtifactUnavailable(format!(
                "unsupported model artifact {location}, expected .json or .onnx"
            ))),
        }
    }
}

/// Resolves a model location (local path or HTTP(S) object-storage URL) into a `ModelSession`.
pub struct ModelArtifactLoader {
    client: Client,
    cache_dir: PathBuf,
}

impl ModelArtifactLoader {
    pub fn new(cache_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self, PredictionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PredictionError::ArtifactUnavailable(format!("cannot build http client: {e}")))?;

        Ok(Self {
            client,
            cache_dir: cache_dir.into(),
        })
    }

    pub async fn load(&self, location: &str) -> Result<ModelSession, PredictionError> {
        let format = ArtifactFormat::from_location(location)?;
        let path = if is_remote(location) {
            self.download(location).await?
        } else {
            PathBuf::from(location)
        };

        info!("Loading downloaded model to the session");
        let classifier = open_classifier(&path, format)?;
        Ok(ModelSession::new(classifier, location))
    }

    async fn download(&self, url: &str) -> Result<PathBuf, PredictionError> {
        let parsed = Url::parse(url)
            .map_err(|e| PredictionError::ArtifactUnavailable(format!("invalid artifact URL {url}: {e}")))?;
        let file_name = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty() && *name != "..")
            .unwrap_or("model.bin");
        let target = self.cache_dir.join(file_name);

        info!("Downloading {} from {}", file_name, url);

        let unavailable = |e: reqwest::Error| PredictionError::ArtifactUnavailable(format!("download {url} failed: {e}"));
        let response = self.client.get(parsed.as_str()).send().await.map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(PredictionError::ArtifactUnavailable(format!(
                "download {url} failed with status {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await.map_err(unavailable)?;

        tokio::fs::create_dir_all(&self.cache_dir).await.map_err(|e| {
            PredictionError::ArtifactUnavailable(format!("cannot create {}: {e}", self.cache_dir.display()))
        })?;
        tokio::fs::write(&target, &bytes).await.map_err(|e| {
            PredictionError::ArtifactUnavailable(format!("cannot write {}: {e}", target.display()))
        })?;

        info!("Saved {} bytes to {}", bytes.len(), target.display());
        Ok(target)
    }
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

fn open_classifier(path: &Path, format: ArtifactFormat) -> Result<Box<dyn Classifier>, PredictionError> {
    match format {
        ArtifactFormat::Json => Ok(Box::new(LogisticModel::load(path)?)),
        #[cfg(feature = "onnx")]
        ArtifactFormat::Onnx => {
            let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("onnx");
            Ok(Box::new(super::onnx_model::OnnxModel::load(path, name)?))
        }
        #[cfg(not(feature = "onnx"))]
        ArtifactFormat::Onnx => Err(PredictionError::ArtifactUnavailable(format!(
            "{} is an ONNX model but this build has no ONNX runtime (enable the `onnx` feature)",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::FeatureVector;

    fn loader(dir: &Path) -> ModelArtifactLoader {
        ModelArtifactLoader::new(dir, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_format_from_location() {
        assert_eq!(ArtifactFormat::from_location("models/lr.json").unwrap(), ArtifactFormat::Json);
        assert_eq!(
            ArtifactFormat::from_location("https://bucket.example.com/production/model.ONNX?sig=abc").unwrap(),
            ArtifactFormat::Onnx
        );
        assert!(ArtifactFormat::from_location("model.pkl").is_err());
    }

    #[tokio::test]
    async fn test_load_local_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("direction.json");
        let weights = serde_json::json!({
            "coefficients": vec![0.0; FeatureVector::NUM_FEATURES],
            "intercept": 0.3
        });
        std::fs::write(&path, weights.to_string()).unwrap();

        let session = loader(dir.path()).load(path.to_str().unwrap()).await.unwrap();

        assert_eq!(session.model_name(), "direction");
        assert_eq!(session.source(), path.to_str().unwrap());
    }

    #[tokio::test]
    async fn test_missing_artifact_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");

        let err = loader(dir.path()).load(missing.to_str().unwrap()).await.err().unwrap();
        assert!(matches!(err, PredictionError::ArtifactUnavailable(_)));
    }

    /// Serves `weights` at `/production/direction.json` on an ephemeral local port
    async fn artifact_server(weights: String) -> String {
        let app = axum::Router::new().route(
            "/production/direction.json",
            axum::routing::get(move || {
                let body = weights.clone();
                async move { body }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn weights_json() -> String {
        serde_json::json!({
            "coefficients": vec![0.1; FeatureVector::NUM_FEATURES],
            "intercept": -0.2
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_download_caches_artifact() {
        let base = artifact_server(weights_json()).await;
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("model_cache");
        let url = format!("{base}/production/direction.json?X-Amz-Signature=abc");

        let session = loader(&cache).load(&url).await.unwrap();

        let cached = cache.join("direction.json");
        assert_eq!(std::fs::read_to_string(&cached).unwrap(), weights_json());
        assert_eq!(session.model_name(), "direction");
        assert_eq!(session.source(), url);
    }

    #[tokio::test]
    async fn test_download_error_status_is_unavailable() {
        let base = artifact_server(weights_json()).await;
        let dir = tempfile::tempdir().unwrap();

        let err = loader(dir.path())
            .load(&format!("{base}/production/missing.json"))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, PredictionError::ArtifactUnavailable(_)));
        assert!(err.to_string().contains("404"));
        assert!(!dir.path().join("missing.json").exists());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let dir = tempfile::tempdir().unwrap();

        let err = loader(dir.path())
            .load(&format!("http://{addr}/production/direction.json"))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, PredictionError::ArtifactUnavailable(_)));
    }

    #[tokio::test]
    async fn test_corrupt_artifact_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.json");
        std::fs::write(&path, "not json").unwrap();

        let err = loader(dir.path()).load(path.to_str().unwrap()).await.err().unwrap();
        assert!(matches!(err, PredictionError::ArtifactUnavailable(_)));
    }
}
