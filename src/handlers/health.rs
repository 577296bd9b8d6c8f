//! Status endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness check, unprotected by default
//! - `GET /metrics` - Prometheus text exposition of this service's registry
//!
//! `/metrics` is behind the API key unless listed in `UNPROTECTED_PATHS`.
//! The same text is served without auth on `METRICS_PORT` when enabled.

use axum::Json;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use tracing::instrument;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Content type of the Prometheus text format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "ok",
///   "service": "orders",
///   "version": "0.1.0",
///   "uptime_seconds": 3600
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::ok(
        state.config.service_name.clone(),
        state.uptime_seconds(),
    ))
}

/// Render every histogram family of the registry.
#[instrument(skip(state))]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], state.metrics.render())
}
