//! Web server module for the sensor logger.
//!
//! Provides the HTTP query surface over stored readings, the manual-entry
//! endpoint and liveness/readiness probes. Internal failures are logged and
//! answered with a generic 500 body; the cause never reaches the client.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::ingest::{IngestMonitor, IngestSnapshot};
use crate::manual::{ManualEntry, ManualEntryError};
use crate::reading::{Clock, SystemClock};
use crate::storage::{ReadingQuery, ReadingReader, ReadingSink, StorageError, WriteOutcome};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub reader: ReadingReader,
    pub sink: Arc<dyn ReadingSink>,
    pub clock: Arc<dyn Clock>,
    /// Present when this process also runs the ingest loop.
    pub ingest: Option<IngestMonitor>,
}

impl AppState {
    pub fn new(reader: ReadingReader, sink: Arc<dyn ReadingSink>) -> Self {
        Self {
            reader,
            sink,
            clock: Arc::new(SystemClock),
            ingest: None,
        }
    }

    pub fn with_ingest(mut self, monitor: IngestMonitor) -> Self {
        self.ingest = Some(monitor);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ingest: Option<IngestSnapshot>,
}

/// Query parameters for the readings API.
///
/// `limit` is taken as text so a non-numeric value falls back to the
/// default instead of failing the request.
#[derive(Debug, Deserialize)]
pub struct ReadingsQueryParams {
    pub limit: Option<String>,
    pub sensor_id: Option<String>,
    #[serde(rename = "type")]
    pub sensor_type: Option<String>,
}

impl ReadingsQueryParams {
    fn into_query(self) -> ReadingQuery {
        ReadingQuery {
            limit: self.limit.and_then(|l| l.trim().parse::<i64>().ok()),
            sensor_id: self.sensor_id.filter(|s| !s.is_empty()),
            sensor_type: self.sensor_type.filter(|s| !s.is_empty()),
        }
    }
}

/// Handler failure, rendered without internal detail.
#[derive(Debug)]
enum ApiError {
    Internal(StorageError),
    Invalid(ManualEntryError),
    Duplicate,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Internal(err) => {
                tracing::error!(error = %err, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
            Self::Invalid(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response(),
            Self::Duplicate => (
                StatusCode::CONFLICT,
                Json(json!({ "error": "reading already recorded" })),
            )
                .into_response(),
        }
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/status", get(status_handler))
        .route("/readyz", get(readyz_handler))
        .route("/readings", get(readings_handler).post(record_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Serve `state` on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "HTTP server listening");
    }
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

/// Liveness probe. Does not touch the store.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
        ingest: state.ingest.as_ref().map(IngestMonitor::snapshot),
    })
}

/// Readiness probe that checks database availability.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.reader.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
            ingest: None,
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some("unavailable".to_string()),
                    ingest: None,
                }),
            )
                .into_response()
        }
    }
}

/// Readings API endpoint, most recent first.
async fn readings_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReadingsQueryParams>,
) -> Result<Response, ApiError> {
    let query = params.into_query();
    let readings = state
        .reader
        .query(&query)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(readings).into_response())
}

/// Manual-entry endpoint.
async fn record_handler(
    State(state): State<Arc<AppState>>,
    Json(entry): Json<ManualEntry>,
) -> Result<Response, ApiError> {
    let reading = entry
        .into_reading(state.clock.as_ref())
        .map_err(ApiError::Invalid)?;

    match state.sink.write(reading.clone()).await {
        Ok(WriteOutcome::Written) => {
            tracing::info!(reading = %reading, "Manual reading recorded");
            Ok((StatusCode::CREATED, Json(reading)).into_response())
        }
        Ok(WriteOutcome::Duplicate) => {
            tracing::debug!(reading = %reading, "Manual reading is a duplicate");
            Err(ApiError::Duplicate)
        }
        Err(e) => Err(ApiError::Internal(e)),
    }
}
