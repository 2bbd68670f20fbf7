use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::market_data::YAHOO_CHART_API;

/// Service configuration: built-in defaults, then an optional TOML file,
/// then `FORECAST_*` environment variables (e.g. `FORECAST_SERVER__PORT`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub model: ModelSettings,
    pub market_data: MarketDataSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9596,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Local path or HTTP(S) URL of the classifier artifact
    pub location: String,
    /// Where downloaded artifacts are stored
    pub cache_dir: String,
    pub download_timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            location: "models/model.json".to_string(),
            cache_dir: "model_cache".to_string(),
            download_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataSettings {
    pub base_url: String,
    /// Calendar days of history requested per prediction
    pub lookback_days: u32,
    pub fetch_timeout_secs: u64,
    pub requests_per_second: u32,
}

impl Default for MarketDataSettings {
    fn default() -> Self {
        Self {
            base_url: YAHOO_CHART_API.to_string(),
            lookback_days: 31,
            fetch_timeout_secs: 10,
            requests_per_second: 2,
        }
    }
}

impl MarketDataSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("FORECAST")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be > 0".to_string());
        }
        if self.model.location.trim().is_empty() {
            errors.push("model.location must be set".to_string());
        }
        if self.market_data.lookback_days == 0 {
            errors.push("market_data.lookback_days must be > 0".to_string());
        }
        if self.market_data.fetch_timeout_secs == 0 {
            errors.push("market_data.fetch_timeout_secs must be > 0".to_string());
        }
        if reqwest::Url::parse(&self.market_data.base_url).map_or(true, |u| u.cannot_be_a_base()) {
            errors.push(format!("market_data.base_url {:?} is not a usable URL", self.market_data.base_url));
        }
        if self.market_data.requests_per_second == 0 {
            errors.push("market_data.requests_per_second must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
