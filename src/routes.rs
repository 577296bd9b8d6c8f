//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ Request Duration │ ← <service>_http_duration_seconds, 401s included
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │  Authentication  │ ← 401 if missing/invalid (bypassed for UNPROTECTED_PATHS)
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │   Total Count    │ ← [{"x_total_count": N}, [...]] → [...] + X-Total-Count
//! └────────┬─────────┘
//!          │
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/health`, `/metrics` - Status endpoints, mounted by [`build_router`]
//! - everything else - Host service routes passed in by the caller

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::AppResult;
use crate::handlers;
use crate::instrument::{Endpoint, Namespace};
use crate::middleware::{ApiKeyAuth, RequestDurationLayer, TotalCountLayer};
use crate::state::AppState;

/// Name of the namespace holding the status endpoints.
pub const STATUS_NAMESPACE: &str = "api_commons::status";

/// Status endpoints that are never call-timed.
const UNTIMED_STATUS_ENDPOINTS: &[&str] = &["metrics"];

/// The status endpoints as an instrumentable namespace.
pub fn status_namespace() -> Namespace<Endpoint<AppState>> {
    Namespace::new(STATUS_NAMESPACE)
        .define("health", Endpoint::new("/health", get(handlers::health_check)))
        .define("metrics", Endpoint::new("/metrics", get(handlers::metrics)))
}

/// Build the application router with all routes and middleware configured.
///
/// `routes` are the host service's own routes. They are merged with the
/// status endpoints and wrapped in the shared middleware stack.
///
/// # Errors
///
/// Returns `AppError::ConfigError` for an invalid auth header name and
/// `AppError::DuplicateMetric` when the registry rejects re-registration.
pub fn build_router(state: AppState, routes: Router<AppState>) -> AppResult<Router> {
    let config = &state.config;

    // =========================================================================
    // Status Endpoints
    // =========================================================================
    let mut status = status_namespace();
    let timed = status.instrument(&state.metrics.call_durations()?, UNTIMED_STATUS_ENDPOINTS);
    info!(namespace = status.name(), timed, "Status endpoints instrumented");

    let mut router = routes.merge(status.into_router());

    // =========================================================================
    // Apply Middleware Stack (order matters - applied inner to outer)
    // =========================================================================

    // 1. List count rewriting
    router = router.layer(TotalCountLayer::new(config.max_list_body_size));

    // 2. Authentication
    let auth_layer = ApiKeyAuth::from_config(config)?;
    info!(
        header = %auth_layer.header(),
        unprotected = ?config.unprotected_paths,
        "API key authentication enabled"
    );
    router = router.layer(auth_layer);

    // 3. Request duration (outside auth so rejections are measured)
    router = router.layer(RequestDurationLayer::new(
        state.metrics.http_durations()?,
        config.api_version_prefix.as_deref(),
    ));

    // 4. Tracing
    router = router.layer(TraceLayer::new_for_http());

    // Add state
    Ok(router.with_state(state))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::metrics::{DuplicatePolicy, MetricsRegistry, sample_count};
    use crate::models::ListEnvelope;

    fn state() -> AppState {
        let config = Config {
            service_name: "svc".to_string(),
            allowed_api_keys: vec!["secret".to_string()],
            ..Config::default()
        };
        AppState::new(config, MetricsRegistry::new("svc", DuplicatePolicy::Reuse).unwrap())
    }

    fn host_routes() -> Router<AppState> {
        Router::new().route(
            "/orders",
            get(|| async { ListEnvelope::new(2, vec!["a", "b"]) }),
        )
    }

    async fn send(router: &Router, path: &str, key: Option<&str>) -> axum::response::Response {
        let mut req = Request::builder().uri(path);
        if let Some(key) = key {
            req = req.header("X-API-Key", key);
        }
        router
            .clone()
            .oneshot(req.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[test]
    fn test_status_namespace_members() {
        let status = status_namespace();
        assert_eq!(status.short_name(), "status");
        assert_eq!(status.names().collect::<Vec<_>>(), vec!["health", "metrics"]);
    }

    #[tokio::test]
    async fn test_health_is_unprotected_and_timed() {
        let state = state();
        let metrics = state.metrics.clone();
        let router = build_router(state, host_routes()).unwrap();

        let response = send(&router, "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(&router, "/metrics", Some("secret")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let rendered = metrics.render();
        assert_eq!(
            sample_count(&rendered, "svc_call_duration_seconds", &[r#"call="status_health""#]),
            Some(1)
        );
        assert_eq!(
            sample_count(&rendered, "svc_call_duration_seconds", &[r#"call="status_metrics""#]),
            None
        );
    }

    #[tokio::test]
    async fn test_protected_route_requires_key() {
        let router = build_router(state(), host_routes()).unwrap();

        let response = send(&router, "/orders", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(&router, "/orders", Some("secret")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-total-count"], "2");
    }

    #[tokio::test]
    async fn test_rejections_are_measured() {
        let state = state();
        let metrics = state.metrics.clone();
        let router = build_router(state, host_routes()).unwrap();

        send(&router, "/orders", Some("wrong")).await;

        assert_eq!(
            sample_count(
                &metrics.render(),
                "svc_http_duration_seconds",
                &[r#"path_prefix="orders""#, r#"method="GET""#, r#"status="401""#],
            ),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_unauthenticated_junk_paths_do_not_grow_series() {
        let state = state();
        let metrics = state.metrics.clone();
        let router = build_router(state, host_routes()).unwrap();

        for i in 0..200 {
            let response = send(&router, &format!("/junk{i}/x"), None).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        let rendered = metrics.render();
        let series = rendered
            .lines()
            .filter(|line| line.starts_with("svc_http_duration_seconds_count{"))
            .count();
        assert_eq!(series, 1);
        assert_eq!(
            sample_count(
                &rendered,
                "svc_http_duration_seconds",
                &[r#"path_prefix="unmatched""#, r#"status="401""#],
            ),
            Some(200)
        );
    }

    #[tokio::test]
    async fn test_build_router_twice_with_reuse_policy() {
        let state = state();
        assert!(build_router(state.clone(), Router::new()).is_ok());
        assert!(build_router(state, Router::new()).is_ok());
    }

    #[tokio::test]
    async fn test_build_router_twice_with_reject_policy() {
        let state = AppState::new(
            Config::default(),
            MetricsRegistry::new("svc", DuplicatePolicy::Reject).unwrap(),
        );
        assert!(build_router(state.clone(), Router::new()).is_ok());
        assert!(build_router(state, Router::new()).is_err());
    }
}
