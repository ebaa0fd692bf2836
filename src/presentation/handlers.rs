// HTTP request handlers
use crate::domain::disease::Classification;
use crate::domain::growth::{CropOutlook, CropType};
use crate::domain::irrigation::{MoistureBand, ZoneEvaluation};
use crate::domain::snapshot::{FarmSnapshot, StreamHealth};
use crate::error::AnalyticsError;
use crate::infrastructure::ndjson_stream::stream_from_receiver;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
}

impl From<AnalyticsError> for ApiError {
    fn from(e: AnalyticsError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmListing {
    pub id: String,
    pub name: String,
    pub crop: Option<CropType>,
    pub stream: StreamHealth,
}

#[derive(Deserialize)]
pub struct StreamQuery {
    pub every_secs: Option<u64>,
}

#[derive(Deserialize)]
pub struct OutlookQuery {
    /// Comma-separated growth observations, one per elapsed week.
    pub observed: Option<String>,
}

#[derive(Deserialize)]
pub struct EvaluateQuery {
    pub moisture: f64,
    pub min: f64,
    pub max: f64,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// List configured farms
pub async fn list_farms(State(state): State<Arc<AppState>>) -> Json<Vec<FarmListing>> {
    let farms = state
        .facade
        .farms()
        .into_iter()
        .map(|farm| FarmListing {
            name: farm.display_name(),
            stream: state.facade.stream_health(&farm.id),
            crop: farm.crop,
            id: farm.id,
        })
        .collect();
    Json(farms)
}

/// Current snapshot of one farm
pub async fn farm_snapshot(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Json<FarmSnapshot> {
    Json(state.facade.get_farm_snapshot(&id).await)
}

/// Stream periodic snapshots; ingestion runs while the client stays connected
pub async fn stream_snapshots(
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let every = match query.every_secs {
        Some(0) => return Err(ApiError::BadRequest("every_secs must be positive".to_string())),
        Some(secs) => Duration::from_secs(secs),
        None => state.default_stream_every,
    };

    tracing::info!("Streaming snapshots for farm {} every {:?}", id, every);
    let rx = state.facade.stream_snapshots(&id, every);
    Ok(stream_from_receiver(rx).into_response())
}

pub async fn crop_outlook(
    Path(crop): Path<String>,
    Query(query): Query<OutlookQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CropOutlook>, ApiError> {
    let observed = parse_observations(query.observed.as_deref().unwrap_or(""))?;
    Ok(Json(state.facade.outlook(&CropType::new(&crop), &observed)))
}

pub async fn classify(
    Path(confidence): Path<f64>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Classification>, ApiError> {
    Ok(Json(state.facade.classify(confidence)?))
}

pub async fn evaluate_irrigation(
    Query(query): Query<EvaluateQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ZoneEvaluation>, ApiError> {
    if !query.moisture.is_finite() {
        return Err(ApiError::BadRequest("moisture must be a finite number".to_string()));
    }
    let band = MoistureBand::new(query.min, query.max)?;
    Ok(Json(state.facade.evaluate(query.moisture, &band)))
}

fn parse_observations(raw: &str) -> Result<Vec<f64>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(ApiError::BadRequest(format!("invalid observation '{}'", part))),
        })
        .collect()
}
