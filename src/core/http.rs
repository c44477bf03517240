//! Request gateway: HTTP endpoints served by `api-server` using Axum

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};
use uuid::Uuid;

use crate::db::{NotificationRepository, ScreeningRepository, StoreHealth};
use crate::error::ScreenerError;
use crate::jobs::ScreeningEngine;
use crate::metrics::Metrics;
use crate::models::JobStatus;

const DEFAULT_RESULTS_LIMIT: usize = 100;
const DEFAULT_JOBS_LIMIT: usize = 50;
const MAX_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub health: Arc<RwLock<HealthStatus>>,
    pub metrics: Arc<Metrics>,
    pub start_time: Arc<Instant>,
    pub engine: Arc<ScreeningEngine>,
    pub requests: Arc<dyn ScreeningRepository>,
    pub jobs: Arc<dyn NotificationRepository>,
    pub store_health: Arc<dyn StoreHealth>,
}

impl AppState {
    pub fn new<S>(engine: Arc<ScreeningEngine>, store: Arc<S>, metrics: Arc<Metrics>) -> Self
    where
        S: ScreeningRepository + NotificationRepository + StoreHealth + 'static,
    {
        Self {
            health: Arc::new(RwLock::new(HealthStatus::default())),
            metrics,
            start_time: Arc::new(Instant::now()),
            engine,
            requests: store.clone(),
            jobs: store.clone(),
            store_health: store,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HealthStatus {
    pub status: String,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

fn store_failure(e: impl std::fmt::Display) -> ApiError {
    error!(error = %e, "Store request failed");
    api_error(StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
}

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let health = state.health.read().await;
    let uptime_seconds = state.start_time.elapsed().as_secs();
    let database = match state.store_health.ping().await {
        Ok(()) => {
            state.metrics.database_connected.set(1.0);
            "ok".to_string()
        }
        Err(e) => {
            state.metrics.database_connected.set(0.0);
            format!("error: {}", e)
        }
    };
    Json(json!({
        "status": health.status,
        "database": database,
        "uptime_seconds": uptime_seconds,
        "service": "optscreen-api"
    }))
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .export()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn worker_metrics(State(metrics): State<Arc<Metrics>>) -> Result<String, StatusCode> {
    metrics
        .export()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// `/metrics` alone, for processes without the gateway.
pub fn metrics_router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(worker_metrics))
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .with_state(metrics)
}

/// Serve [`metrics_router`] until `shutdown` resolves.
pub async fn start_metrics_server<F>(
    port: u16,
    metrics: Arc<Metrics>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!(port = port, "Metrics endpoint available at http://0.0.0.0:{}/metrics", port);
    axum::serve(listener, metrics_router(metrics))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Middleware to track HTTP request metrics
async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    state.metrics.http_requests_in_flight.inc();

    let response = next.run(request).await;
    let status = response.status();
    let duration = start.elapsed();

    state.metrics.http_requests_in_flight.dec();
    state.metrics.http_requests_total.inc();
    state
        .metrics
        .http_request_duration_seconds
        .observe(duration.as_secs_f64());

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = duration.as_millis(),
            "HTTP request error"
        );
    }

    response
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScreenRequestBody {
    pub tickers: Vec<String>,
    pub strategy: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct JobsQuery {
    status: Option<String>,
    limit: Option<usize>,
}

fn clamp_limit(limit: Option<usize>, default: usize) -> usize {
    limit.unwrap_or(default).clamp(1, MAX_LIMIT)
}

/// Queue a screening request
async fn submit_screen(
    State(state): State<AppState>,
    Json(body): Json<ScreenRequestBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    match state
        .engine
        .submit(&body.tickers, &body.strategy, &body.email)
        .await
    {
        Ok(correlation_id) => Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "status": "queued", "correlation_id": correlation_id })),
        )),
        Err(ScreenerError::Validation(e)) => {
            Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
        }
        Err(ScreenerError::Store(e)) => Err(store_failure(e)),
    }
}

/// Latest results for one screener, newest first
async fn get_results(
    State(state): State<AppState>,
    Path(screener_name): Path<String>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = clamp_limit(params.limit, DEFAULT_RESULTS_LIMIT);
    let results = state
        .requests
        .results_for_screener(&screener_name, limit)
        .await
        .map_err(store_failure)?;

    Ok(Json(json!({ "screener": screener_name, "results": results })))
}

/// Request status with its result count and notification state
async fn get_request(
    State(state): State<AppState>,
    Path(correlation_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let request = state
        .requests
        .get_request(correlation_id)
        .await
        .map_err(store_failure)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "request not found"))?;
    let results = state
        .requests
        .results_for_request(correlation_id)
        .await
        .map_err(store_failure)?;
    let job = state
        .jobs
        .job_for_request(correlation_id)
        .await
        .map_err(store_failure)?;

    Ok(Json(json!({
        "correlation_id": request.correlation_id,
        "strategy": request.strategy,
        "tickers": request.tickers,
        "status": request.status,
        "attempts": request.attempts,
        "last_error": request.last_error,
        "result_count": results.len(),
        "notification": job.map(|j| json!({
            "id": j.id,
            "status": j.status,
            "attempts": j.attempts,
            "last_error": j.last_error,
        })),
    })))
}

/// Operator view of notification jobs in one status
async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobsQuery>,
) -> Result<Json<Value>, ApiError> {
    let status: JobStatus = params
        .status
        .as_deref()
        .unwrap_or("failed")
        .parse()
        .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, e))?;
    let limit = clamp_limit(params.limit, DEFAULT_JOBS_LIMIT);

    let jobs = state
        .jobs
        .jobs_with_status(status, limit)
        .await
        .map_err(store_failure)?;

    Ok(Json(json!({ "status": status, "jobs": jobs })))
}

async fn list_strategies(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "strategies": state.engine.registry().all() }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/screen", post(submit_screen))
        .route("/results/{screener_name}", get(get_results))
        .route("/requests/{correlation_id}", get(get_request))
        .route("/jobs", get(list_jobs))
        .route("/strategies", get(list_strategies))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Serve `state` on `port` until `shutdown` resolves.
pub async fn start_server<F>(
    port: u16,
    state: AppState,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!(port = port, "HTTP server listening on port {}", port);
    info!(
        "Metrics endpoint available at http://0.0.0.0:{}/metrics",
        port
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
