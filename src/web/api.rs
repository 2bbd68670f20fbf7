use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::AppState;
use crate::error::PredictionError;
use crate::types::{Direction, PredictionResult};

/// Key of the single field in every failure body
pub const ERROR_KEY: &str = "Error predicting";

/// Wire shape of a successful prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub ticker: String,
    pub reference_data: String,
    pub forecast_close_date: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub last_close_value: Decimal,
    pub label: Direction,
    pub probability: String,
}

impl From<&PredictionResult> for PredictionResponse {
    fn from(result: &PredictionResult) -> Self {
        Self {
            ticker: result.ticker.clone(),
            reference_data: result.reference_date.format("%Y-%m-%d").to_string(),
            forecast_close_date: result.forecast_date.format("%Y-%m-%d").to_string(),
            last_close_value: round_price(result.last_close),
            label: result.label,
            probability: format_probability(result.probability),
        }
    }
}

fn round_price(price: f64) -> Decimal {
    Decimal::from_f64(price).unwrap_or_default().round_dp(3)
}

/// Formats a [0, 1] probability as a percentage with two decimals, e.g. `"73.50%"`.
pub fn format_probability(probability: f64) -> String {
    format!("{:.2}%", probability * 100.0)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Boundary conversion of a failed prediction into status code and payload
#[derive(Debug)]
pub struct ApiError(pub PredictionError);

impl From<PredictionError> for ApiError {
    fn from(e: PredictionError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PredictionError::InvalidTicker(_) => StatusCode::BAD_REQUEST,
            PredictionError::DataUnavailable { .. } => StatusCode::BAD_GATEWAY,
            PredictionError::InsufficientHistory { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PredictionError::ArtifactUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PredictionError::ScoringFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match &self.0 {
            // Contract violations stay in the logs
            PredictionError::ScoringFailure(_) => "internal scoring error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ ERROR_KEY: self.message() }))).into_response()
    }
}

#[tracing::instrument(skip(state), fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn predict(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let result = state.predictor.predict(&ticker).await?;

    info!(
        "{} {} with {:.2}% confidence (reference {}, last close {:.3})",
        result.ticker,
        result.label,
        result.probability * 100.0,
        result.reference_date,
        result.last_close
    );

    Ok(Json(PredictionResponse::from(&result)))
}

pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}
