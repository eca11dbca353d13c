//! HTTP front door
//!
//! Thin axum layer over the [`RefreshScheduler`]: every handler delegates to
//! a scheduler or store operation. The public routes are described by an
//! OpenAPI 3 document served at `/apidocs/openapi.json`.

use crate::{
    error::FetchError,
    scheduler::RefreshScheduler,
    types::{HealthStatus, MarketRecord, RefreshTrigger},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Market Snapshot API",
        description = "Cached CoinMarketCap listings, refreshed on a timer or on demand"
    ),
    paths(fetch, market_data),
    components(schemas(MarketRecord, FetchResponse, ErrorBody)),
    tags((name = "market", description = "Listings snapshot"))
)]
struct ApiDoc;

/// Shared application state, passed to all route handlers via `axum::extract::State`.
pub struct AppState {
    pub scheduler: Arc<RefreshScheduler>,
}

impl AppState {
    pub fn new(scheduler: Arc<RefreshScheduler>) -> Arc<Self> {
        Arc::new(Self { scheduler })
    }
}

/// Body of a successful `GET /api/fetch`
#[derive(Debug, Serialize, ToSchema)]
pub struct FetchResponse {
    pub message: String,
    /// Records in the committed snapshot
    pub count: usize,
    /// Sequence number of the committed snapshot
    pub sequence: u64,
    pub fetched_at: DateTime<Utc>,
}

/// Body of a failed `GET /api/fetch`
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    /// One of `unreachable`, `upstream_rejected` or `malformed_response`
    pub kind: String,
    pub detail: String,
}

/// Error responses of the front door
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to fetch data: {0}")]
    Fetch(#[from] FetchError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Fetch(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "Failed to fetch data".to_string(),
                    kind: e.kind().to_string(),
                    detail: e.to_string(),
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Assemble the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/fetch", get(fetch))
        .route("/api/market_data", get(market_data))
        .route("/api/status", get(status))
        .route("/health", get(health))
        .route("/apidocs/openapi.json", get(openapi))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the router on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// GET /api/fetch — Run one refresh cycle and report the outcome.
#[utoipa::path(
    get,
    path = "/api/fetch",
    tag = "market",
    responses(
        (status = 200, description = "Snapshot replaced", body = FetchResponse),
        (status = 500, description = "Fetch failed, snapshot unchanged", body = ErrorBody)
    )
)]
async fn fetch(State(state): State<Arc<AppState>>) -> Result<Json<FetchResponse>, ApiError> {
    let report = state.scheduler.refresh_now(RefreshTrigger::Manual).await?;

    Ok(Json(FetchResponse {
        message: "Data Fetched and Stored!".to_string(),
        count: report.count,
        sequence: report.sequence,
        fetched_at: report.fetched_at,
    }))
}

/// GET /api/market_data — Current snapshot as a list of records.
#[utoipa::path(
    get,
    path = "/api/market_data",
    tag = "market",
    responses(
        (status = 200, description = "Current records, empty before the first fetch",
            body = [MarketRecord])
    )
)]
async fn market_data(State(state): State<Arc<AppState>>) -> Json<Vec<MarketRecord>> {
    Json(state.scheduler.records().await)
}

/// GET /api/status — Scheduler state, snapshot summary and refresh metrics.
async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let scheduler = &state.scheduler;
    let snapshot = scheduler.snapshot().await;

    Json(json!({
        "state": scheduler.state(),
        "provider": scheduler.provider_name(),
        "refresh_interval_secs": scheduler.settings().refresh_interval.as_secs(),
        "snapshot": {
            "sequence": snapshot.sequence,
            "fetched_at": snapshot.fetched_at,
            "age_secs": snapshot.age().map(|a| a.as_secs()),
            "count": snapshot.len(),
            "quote_currency": snapshot.quote_currency,
        },
        "metrics": scheduler.metrics().await,
    }))
}

/// GET /health — 503 until a snapshot has been committed.
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.scheduler.health_check().await;
    let code = match health.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    (code, Json(health))
}

/// GET /apidocs/openapi.json
async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
