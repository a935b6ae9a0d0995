//! HTTP endpoint server using Axum

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use crate::core::poller::PollError;
use crate::correlation::SourceKind;
use crate::error::{CheckError, ServiceError};
use crate::metrics::Metrics;
use crate::models::{AlphaId, PoolKind, SyncScope};
use crate::submission::SubmissionChecker;

#[derive(Clone)]
pub struct AppState {
    pub health: Arc<RwLock<HealthStatus>>,
    pub metrics: Arc<Metrics>,
    pub start_time: Arc<Instant>,
    pub checker: Option<Arc<SubmissionChecker>>,
}

#[derive(Clone, Debug)]
pub struct HealthStatus {
    pub status: String,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

fn check_error(err: CheckError) -> ApiError {
    let status = match &err {
        CheckError::Precondition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CheckError::BudgetExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        CheckError::Rejected { .. } => StatusCode::CONFLICT,
        CheckError::Service {
            source: ServiceError::Gone(_),
            ..
        } => StatusCode::NOT_FOUND,
        CheckError::Service { .. } => StatusCode::BAD_GATEWAY,
        CheckError::Cache { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({
            "error": err.to_string(),
            "pool_kind": err.pool_kind(),
            "stage": err.stage(),
            "retryable": err.is_retryable(),
        })),
    )
}

fn checker(state: &AppState) -> Result<&Arc<SubmissionChecker>, ApiError> {
    state
        .checker
        .as_ref()
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "submission checker not configured"))
}

pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let health = state.health.read().await;
    let uptime_seconds = state.start_time.elapsed().as_secs();
    Ok(Json(json!({
        "status": health.status,
        "uptime_seconds": uptime_seconds,
        "service": "alphagate"
    })))
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .export()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
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

#[derive(Debug, Deserialize)]
struct CheckQuery {
    /// Pool selection: `prod`, `self`, `power-pool`, `both`, `all` or a comma list
    pools: Option<String>,
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchCheckRequest {
    alpha_ids: Vec<AlphaId>,
    pool_kind: PoolKind,
}

#[derive(Debug, Deserialize)]
struct SyncRequest {
    region: String,
    pool_kind: PoolKind,
}

/// Correlation verdicts for one alpha
async fn check_alpha(
    State(state): State<AppState>,
    Path(alpha_id): Path<String>,
    Query(params): Query<CheckQuery>,
) -> Result<Json<Value>, ApiError> {
    let checker = checker(&state)?;
    let pools = PoolKind::parse_selection(params.pools.as_deref().unwrap_or("all"))
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    let source: SourceKind = params
        .source
        .as_deref()
        .unwrap_or("remote")
        .parse()
        .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, e))?;

    let report = checker
        .check_all(&AlphaId::new(alpha_id), &pools, source)
        .await
        .map_err(check_error)?;
    Ok(Json(json!(report)))
}

/// Local verdicts for several candidates plus their pairwise matrix
async fn batch_check(
    State(state): State<AppState>,
    Json(request): Json<BatchCheckRequest>,
) -> Result<Json<Value>, ApiError> {
    let checker = checker(&state)?;
    if request.alpha_ids.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "alpha_ids must not be empty"));
    }
    let report = checker
        .check_batch(&request.alpha_ids, request.pool_kind)
        .await
        .map_err(check_error)?;
    Ok(Json(json!(report)))
}

/// Platform pre-submission checks
async fn readiness(
    State(state): State<AppState>,
    Path(alpha_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let checker = checker(&state)?;
    let report = checker
        .readiness(&AlphaId::new(alpha_id))
        .await
        .map_err(|e| {
            let status = match &e {
                PollError::BudgetExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
                PollError::Failed(_) => StatusCode::CONFLICT,
                PollError::Service(ServiceError::Gone(_)) => StatusCode::NOT_FOUND,
                PollError::Service(_) => StatusCode::BAD_GATEWAY,
            };
            api_error(status, e.to_string())
        })?;
    Ok(Json(json!({
        "passed": report.passed(),
        "report": report,
    })))
}

/// Refresh the local baseline for one region and pool
async fn sync_baseline(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<Value>, ApiError> {
    let checker = checker(&state)?;
    let scope = SyncScope::new(request.region, request.pool_kind);
    let report = checker
        .synchronizer()
        .sync(&scope)
        .await
        .map_err(check_error)?;
    Ok(Json(json!({
        "complete": report.is_complete(),
        "report": report,
    })))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/alphas/{id}/check", get(check_alpha))
        .route("/api/alphas/{id}/readiness", get(readiness))
        .route("/api/alphas/batch-check", post(batch_check))
        .route("/api/baseline/sync", post(sync_baseline))
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

pub async fn start_server(
    port: u16,
    metrics: Arc<Metrics>,
    checker: Option<Arc<SubmissionChecker>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = AppState {
        health: Arc::new(RwLock::new(HealthStatus::default())),
        metrics,
        start_time: Arc::new(Instant::now()),
        checker,
    };
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!(port = port, "HTTP server listening on port {}", port);
    info!(
        "Metrics endpoint available at http://0.0.0.0:{}/metrics",
        port
    );
    axum::serve(listener, app).await?;

    Ok(())
}
