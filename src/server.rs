use crate::error::PipelineError;
use crate::metrics::{self, ApiMetrics};
use crate::storage::Store;
use crate::types::{Forecast, GoldFeature, RegimeState};
use axum::{
    extract::{rejection::QueryRejection, Path, Query},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Extension, Router,
};
use chrono::NaiveDate;
use hyper::Server;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const DEFAULT_SIGNAL_LIMIT: i64 = 52;
pub const MAX_SIGNAL_LIMIT: i64 = 5000;
pub const DEFAULT_HORIZON_WEEKS: i64 = 4;

#[derive(Debug)]
pub enum ApiError {
    NotFound(&'static str),
    Validation(String),
    Store(PipelineError),
    MetricsUnavailable,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::MetricsUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::NotFound(msg) => msg.to_string(),
            ApiError::Validation(msg) => msg.clone(),
            ApiError::Store(e) => e.to_string(),
            ApiError::MetricsUnavailable => "Metrics recorder is not installed".to_string(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        error!(error = %e, "store query failed");
        ApiError::Store(e)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::Validation(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.detail() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SignalsParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastParams {
    pub horizon_weeks: Option<i64>,
}

#[derive(Debug, Serialize)]
struct Signal {
    week: NaiveDate,
    feature_name: String,
    feature_value: f64,
}

impl From<GoldFeature> for Signal {
    fn from(f: GoldFeature) -> Self {
        Self {
            week: f.week,
            feature_name: f.feature_name,
            feature_value: f.feature_value,
        }
    }
}

#[derive(Debug, Serialize)]
struct SignalsResponse {
    commodity: String,
    signals: Vec<Signal>,
}

fn observed<T: IntoResponse>(route: &'static str, started: Instant, result: Result<T, ApiError>) -> Response {
    let response = result.into_response();
    ApiMetrics::record_request(route, response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}

async fn health() -> Response {
    observed(
        "/health",
        Instant::now(),
        Ok::<_, ApiError>(Json(json!({ "status": "ok" }))),
    )
}

async fn latest_regime(store: &dyn Store, commodity: &str) -> Result<Json<RegimeState>, ApiError> {
    store
        .latest_regime(commodity)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("No regime data found"))
}

async fn recent_signals(
    store: &dyn Store,
    commodity: String,
    params: Result<Query<SignalsParams>, QueryRejection>,
) -> Result<Json<SignalsResponse>, ApiError> {
    let Query(params) = params?;
    let limit = params.limit.unwrap_or(DEFAULT_SIGNAL_LIMIT);
    if !(1..=MAX_SIGNAL_LIMIT).contains(&limit) {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {MAX_SIGNAL_LIMIT}"
        )));
    }
    let rows = store.recent_features(&commodity, limit as usize).await?;
    if rows.is_empty() {
        return Err(ApiError::NotFound("No signals found"));
    }
    Ok(Json(SignalsResponse {
        commodity,
        signals: rows.into_iter().map(Signal::from).collect(),
    }))
}

async fn latest_forecast(
    store: &dyn Store,
    commodity: &str,
    params: Result<Query<ForecastParams>, QueryRejection>,
) -> Result<Json<Forecast>, ApiError> {
    let Query(params) = params?;
    let horizon = params.horizon_weeks.unwrap_or(DEFAULT_HORIZON_WEEKS);
    let horizon = u32::try_from(horizon)
        .ok()
        .filter(|h| *h >= 1)
        .ok_or_else(|| ApiError::Validation("horizon_weeks must be at least 1".to_string()))?;
    store
        .latest_forecast(commodity, horizon)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("No forecast found"))
}

async fn regime(Extension(store): Extension<Arc<dyn Store>>, Path(commodity): Path<String>) -> Response {
    let started = Instant::now();
    let result = latest_regime(store.as_ref(), &commodity).await;
    observed("/regime/:commodity", started, result)
}

async fn signals(
    Extension(store): Extension<Arc<dyn Store>>,
    Path(commodity): Path<String>,
    params: Result<Query<SignalsParams>, QueryRejection>,
) -> Response {
    let started = Instant::now();
    let result = recent_signals(store.as_ref(), commodity, params).await;
    observed("/signals/:commodity", started, result)
}

async fn forecasts(
    Extension(store): Extension<Arc<dyn Store>>,
    Path(commodity): Path<String>,
    params: Result<Query<ForecastParams>, QueryRejection>,
) -> Response {
    let started = Instant::now();
    let result = latest_forecast(store.as_ref(), &commodity, params).await;
    observed("/forecasts/:commodity", started, result)
}

async fn metrics_endpoint() -> Response {
    match metrics::render() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => ApiError::MetricsUnavailable.into_response(),
    }
}

/// Read-only API over the serving store
pub fn create_router(store: Arc<dyn Store>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/regime/:commodity", get(regime))
        .route("/signals/:commodity", get(signals))
        .route("/forecasts/:commodity", get(forecasts))
        .route("/metrics", get(metrics_endpoint))
        .layer(Extension(store))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
}

pub async fn start_server(store: Arc<dyn Store>, port: u16) -> anyhow::Result<()> {
    let app = create_router(store);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("API listening on http://localhost:{port}");
    info!("Health check: http://localhost:{port}/health");

    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down API");
        })
        .await?;
    Ok(())
}
