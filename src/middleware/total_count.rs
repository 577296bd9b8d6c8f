//! `X-Total-Count` response rewriting.
//!
//! Data-access code may return a list together with its total count as
//! `[{"x_total_count": N}, [items...]]`. This layer moves the count into an
//! `X-Total-Count` header and replaces the body with the bare item list, so
//! the count never leaks into the public response schema.
//!
//! Any other body shape passes through untouched.

use std::task::{Context, Poll};

use axum::body::{Body, Bytes, HttpBody};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use serde_json::Value;
use tower::{Layer, Service};
use tracing::{debug, error};

/// Response header carrying the total count.
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Key of the count object in the two-part envelope.
pub const TOTAL_COUNT_FIELD: &str = "x_total_count";

/// Default limit on how much of a JSON body is buffered (10MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// A list body with its count split out.
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenList {
    /// Header value for `X-Total-Count`.
    pub total_count: String,
    /// Serialized item list.
    pub body: Vec<u8>,
}

/// Split `[{"x_total_count": N}, items]` into count and items.
///
/// Returns `None` when the body is not exactly that shape: not JSON, not an
/// array of two elements, a first element without the count field, or a
/// count that is neither a number nor a string.
pub fn rewrite_list_body(body: &[u8]) -> Option<RewrittenList> {
    let Value::Array(mut parts) = serde_json::from_slice::<Value>(body).ok()? else {
        return None;
    };
    if parts.len() != 2 {
        return None;
    }

    let items = parts.pop()?;
    let total_count = match parts.pop()?.get(TOTAL_COUNT_FIELD)? {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };
    let body = serde_json::to_vec(&items).ok()?;

    Some(RewrittenList { total_count, body })
}

/// Layer that applies [`rewrite_list_body`] to JSON responses.
#[derive(Clone, Debug)]
pub struct TotalCountLayer {
    max_body_size: usize,
}

impl TotalCountLayer {
    /// Only bodies of known size (`Content-Length` or an exact size hint) no
    /// larger than `max_body_size` are buffered. Streamed and oversized
    /// bodies pass through unbuffered.
    pub fn new(max_body_size: usize) -> Self {
        Self { max_body_size }
    }
}

impl Default for TotalCountLayer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY_SIZE)
    }
}

impl<S> Layer<S> for TotalCountLayer {
    type Service = TotalCountService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TotalCountService {
            inner,
            max_body_size: self.max_body_size,
        }
    }
}

/// Service wrapper produced by [`TotalCountLayer`].
#[derive(Clone)]
pub struct TotalCountService<S> {
    inner: S,
    max_body_size: usize,
}

impl<S> Service<Request<Body>> for TotalCountService<S>
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

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let max_body_size = self.max_body_size;
        let fut = self.inner.call(req);

        Box::pin(async move {
            let response = fut.await?;
            if !is_json(&response) || !fits_buffer(&response, max_body_size) {
                return Ok(response);
            }

            let (mut parts, body) = response.into_parts();
            let bytes = match axum::body::to_bytes(body, max_body_size).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(error = %e, "Failed to buffer list response body");
                    return Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response());
                }
            };

            let Some(rewritten) = rewrite_list_body(&bytes) else {
                return Ok(Response::from_parts(parts, Body::from(bytes)));
            };

            let Ok(header) = HeaderValue::from_str(&rewritten.total_count) else {
                return Ok(Response::from_parts(parts, Body::from(bytes)));
            };

            debug!(total_count = %rewritten.total_count, "Moved list count into header");
            parts.headers.insert(TOTAL_COUNT_HEADER, header);
            parts.headers.remove(CONTENT_LENGTH);
            Ok(Response::from_parts(parts, Body::from(Bytes::from(rewritten.body))))
        })
    }
}

fn is_json(response: &Response<Body>) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .split(';')
                .next()
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        })
}

/// Whether the body has a known size within `max_body_size`.
fn fits_buffer(response: &Response<Body>, max_body_size: usize) -> bool {
    let declared = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    let limit = u64::try_from(max_body_size).unwrap_or(u64::MAX);

    declared
        .or_else(|| response.body().size_hint().exact())
        .is_some_and(|size| size <= limit)
}
