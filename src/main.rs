use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};

use stock_direction_forecaster::clock::SystemClock;
use stock_direction_forecaster::config::Settings;
use stock_direction_forecaster::engine::PredictionService;
use stock_direction_forecaster::market_data::{MarketDataSource, StaticMarketData, YahooFinanceClient};
use stock_direction_forecaster::ml::{ModelArtifactLoader, ModelSession};
use stock_direction_forecaster::web::{self, ApiError, AppState, PredictionResponse, ERROR_KEY};

#[derive(Parser)]
#[command(name = "stock-direction-forecaster")]
#[command(version)]
#[command(about = "Forecasts whether a stock closes up or down today", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Model artifact location (local path or http(s) URL), overrides config
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve predictions over HTTP (default)
    Serve {
        /// Listen port, overrides config
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run a single prediction and print the response
    Predict {
        /// Ticker symbol, e.g. AAPL
        ticker: String,

        /// Read bars from a JSON file instead of the market data API
        #[arg(long)]
        bars_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json_logs)?;

    let mut settings = Settings::load(Some(cli.config.as_path()))?;
    if let Some(model) = cli.model {
        settings.model.location = model;
    }

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            if let Some(port) = port {
                settings.server.port = port;
            }
            validate(&settings)?;
            serve(settings).await
        }
        Commands::Predict { ticker, bars_file } => {
            validate(&settings)?;
            predict_once(settings, &ticker, bars_file.as_deref()).await
        }
    }
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn validate(settings: &Settings) -> Result<()> {
    settings
        .validate()
        .map_err(|errors| anyhow!("invalid configuration: {}", errors.join(", ")))
}

/// Loads the model once; any failure here aborts startup.
async fn load_session(settings: &Settings) -> Result<Arc<ModelSession>> {
    let loader = ModelArtifactLoader::new(
        &settings.model.cache_dir,
        Duration::from_secs(settings.model.download_timeout_secs),
    )?;

    match loader.load(&settings.model.location).await {
        Ok(session) => Ok(Arc::new(session)),
        Err(e) => {
            error!("Failed to load model: {}", e);
            Err(e.into())
        }
    }
}

fn build_service(
    settings: &Settings,
    session: Arc<ModelSession>,
    source: Arc<dyn MarketDataSource>,
) -> PredictionService {
    PredictionService::new(
        source,
        session,
        Arc::new(SystemClock),
        settings.market_data.lookback_days,
        settings.market_data.fetch_timeout(),
    )
}

fn yahoo_source(settings: &Settings) -> Result<Arc<dyn MarketDataSource>> {
    let client = YahooFinanceClient::new(
        &settings.market_data.base_url,
        settings.market_data.fetch_timeout(),
        settings.market_data.requests_per_second,
    )?;
    Ok(Arc::new(client))
}

async fn serve(settings: Settings) -> Result<()> {
    info!("Stock Direction Forecaster v{}", env!("CARGO_PKG_VERSION"));

    let session = load_session(&settings).await?;
    let service = build_service(&settings, session, yahoo_source(&settings)?);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let result = web::start_server(AppState::new(service), addr, web::shutdown_signal()).await;

    info!("Resources cleaned up");
    result
}

async fn predict_once(settings: Settings, ticker: &str, bars_file: Option<&Path>) -> Result<()> {
    let source: Arc<dyn MarketDataSource> = match bars_file {
        Some(path) => Arc::new(StaticMarketData::load_json(path)?),
        None => yahoo_source(&settings)?,
    };
    let session = load_session(&settings).await?;
    let service = build_service(&settings, session, source);

    match service.predict(ticker).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&PredictionResponse::from(&result))?);
            Ok(())
        }
        Err(e) => {
            let api_error = ApiError(e);
            println!("{}", serde_json::json!({ ERROR_KEY: api_error.message() }));
            Err(anyhow!("prediction failed with status {}", api_error.status()))
        }
    }
}
