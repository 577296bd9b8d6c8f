//! Whole-request latency middleware.
//!
//! Records `<service>_http_duration_seconds{path_prefix, method, status}` for
//! every request that reaches it. Install it outside the auth layer so that
//! rejected requests are measured too.
//!
//! # Path Prefix
//!
//! The `path_prefix` label is the first segment of the *matched route*
//! (axum's [`MatchedPath`]) after an optional API version prefix is stripped.
//! Requests that matched no route share the single label `unmatched`, so the
//! number of series is bounded by the registered routes whatever clients send.
//! The layer must therefore be added with `Router::layer`, which runs after
//! routing.
//!
//! | Version prefix | Matched route            | Label       |
//! |----------------|--------------------------|-------------|
//! | none           | `/orders/{id}`           | `orders`    |
//! | `/api/v1`      | `/api/v1/orders/{id}`    | `orders`    |
//! | `/api/v1`      | `/health`                | `health`    |
//! | any            | `/`                      | `root`      |
//! | any            | no route                 | `unmatched` |

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::trace;

use crate::metrics::{HistogramFamily, names};

/// Label used when the path has no first segment.
pub const ROOT_PATH_PREFIX: &str = "root";

/// Label used when no route matched the request.
pub const UNMATCHED_PATH_PREFIX: &str = "unmatched";

/// Status label recorded when the inner service fails instead of responding.
pub const ERROR_STATUS: &str = "error";

/// When the request entered the duration middleware.
///
/// Inserted into request extensions so handlers can read it.
#[derive(Debug, Clone, Copy)]
pub struct RequestStart(pub Instant);

/// Request duration layer for the Tower middleware stack.
#[derive(Clone, Debug)]
pub struct RequestDurationLayer {
    family: HistogramFamily,
    version_prefix: Option<Arc<str>>,
}

impl RequestDurationLayer {
    /// Create a layer recording into `family`.
    ///
    /// `version_prefix` (e.g. `/api/v1`) is stripped before the path prefix
    /// label is derived. Trailing slashes are ignored.
    pub fn new(family: HistogramFamily, version_prefix: Option<&str>) -> Self {
        let version_prefix = version_prefix
            .map(|p| p.trim_end_matches('/'))
            .filter(|p| !p.is_empty())
            .map(Arc::from);
        Self {
            family,
            version_prefix,
        }
    }
}

impl<S> Layer<S> for RequestDurationLayer {
    type Service = RequestDurationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestDurationService {
            inner,
            family: self.family.clone(),
            version_prefix: self.version_prefix.clone(),
        }
    }
}

/// Request duration service wrapper.
#[derive(Clone)]
pub struct RequestDurationService<S> {
    inner: S,
    family: HistogramFamily,
    version_prefix: Option<Arc<str>>,
}

impl<S> Service<Request<Body>> for RequestDurationService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let started = Instant::now();
        req.extensions_mut().insert(RequestStart(started));

        let prefix = match req.extensions().get::<MatchedPath>() {
            Some(matched) => path_prefix(matched.as_str(), self.version_prefix.as_deref()),
            None => UNMATCHED_PATH_PREFIX,
        }
        .to_string();
        let method = req.method().as_str().to_string();
        let family = self.family.clone();
        let fut = self.inner.call(req);

        Box::pin(async move {
            let result = fut.await;
            let elapsed = started.elapsed().as_secs_f64();

            let status = match &result {
                Ok(response) => response.status().as_str().to_string(),
                Err(_) => ERROR_STATUS.to_string(),
            };
            trace!(path_prefix = %prefix, method = %method, status = %status, elapsed, "Request completed");

            family
                .histogram(&[
                    (names::PATH_PREFIX_LABEL, prefix),
                    (names::METHOD_LABEL, method),
                    (names::STATUS_LABEL, status),
                ])
                .record(elapsed);

            result
        })
    }
}

/// Derive the `path_prefix` label for a route path.
pub fn path_prefix<'a>(path: &'a str, version_prefix: Option<&str>) -> &'a str {
    let stripped = version_prefix
        .and_then(|prefix| {
            path.strip_prefix(prefix)
                .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        })
        .unwrap_or(path);

    stripped
        .split('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(ROOT_PATH_PREFIX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use axum::Router;
    use axum::extract::{Extension, Path};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use tower::ServiceExt;

    use super::*;
    use crate::metrics::{DuplicatePolicy, MetricsRegistry, sample_count};

    #[test]
    fn test_path_prefix_without_version() {
        assert_eq!(path_prefix("/orders/42", None), "orders");
        assert_eq!(path_prefix("/orders", None), "orders");
        assert_eq!(path_prefix("/", None), ROOT_PATH_PREFIX);
        assert_eq!(path_prefix("", None), ROOT_PATH_PREFIX);
    }

    #[test]
    fn test_path_prefix_strips_version() {
        assert_eq!(path_prefix("/api/v1/orders/42", Some("/api/v1")), "orders");
        assert_eq!(path_prefix("/api/v1", Some("/api/v1")), ROOT_PATH_PREFIX);
        assert_eq!(path_prefix("/health", Some("/api/v1")), "health");
    }

    #[test]
    fn test_path_prefix_only_strips_whole_segments() {
        // "/api/v10" is not under "/api/v1"
        assert_eq!(path_prefix("/api/v10/orders", Some("/api/v1")), "api");
    }

    fn orders_router(registry: &MetricsRegistry) -> Router {
        let layer = RequestDurationLayer::new(registry.http_durations().unwrap(), Some("/api/v1/"));
        Router::new()
            .route(
                "/api/v1/orders/{id}",
                post(|Path(id): Path<String>| async move {
                    if id == "denied" {
                        StatusCode::UNAUTHORIZED
                    } else {
                        StatusCode::OK
                    }
                }),
            )
            .route(
                "/api/v1/started",
                get(|Extension(RequestStart(started)): Extension<RequestStart>| async move {
                    assert!(started.elapsed().as_secs() < 60);
                    StatusCode::OK
                }),
            )
            .layer(layer)
    }

    async fn send(router: &Router, method: &str, path: &str) -> StatusCode {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        router.clone().oneshot(req).await.unwrap().status()
    }

    fn series(rendered: &str) -> usize {
        rendered
            .lines()
            .filter(|line| line.starts_with("svc_http_duration_seconds_count{"))
            .count()
    }

    #[tokio::test]
    async fn test_records_status_of_each_response() {
        let registry = MetricsRegistry::new("svc", DuplicatePolicy::Reuse).unwrap();
        let router = orders_router(&registry);

        assert_eq!(send(&router, "POST", "/api/v1/orders/1").await, StatusCode::OK);
        assert_eq!(
            send(&router, "POST", "/api/v1/orders/denied").await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(send(&router, "GET", "/api/v1/started").await, StatusCode::OK);

        let rendered = registry.render();
        for status in ["200", "401"] {
            assert_eq!(
                sample_count(
                    &rendered,
                    "svc_http_duration_seconds",
                    &[
                        r#"path_prefix="orders""#,
                        r#"method="POST""#,
                        &format!(r#"status="{status}""#),
                    ],
                ),
                Some(1),
                "missing observation for status {status}"
            );
        }
    }

    #[tokio::test]
    async fn test_unrouted_paths_share_one_series() {
        let registry = MetricsRegistry::new("svc", DuplicatePolicy::Reuse).unwrap();
        let router = orders_router(&registry);

        for i in 0..50 {
            assert_eq!(
                send(&router, "GET", &format!("/junk{i}/x")).await,
                StatusCode::NOT_FOUND
            );
        }

        let rendered = registry.render();
        assert_eq!(series(&rendered), 1);
        assert_eq!(
            sample_count(
                &rendered,
                "svc_http_duration_seconds",
                &[r#"path_prefix="unmatched""#, r#"status="404""#],
            ),
            Some(50)
        );
    }
}
