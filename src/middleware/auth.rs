//! API key authentication middleware.
//!
//! # Behavior
//!
//! - Paths in the unprotected set pass through unconditionally
//! - Otherwise the configured header must carry a key from the allowlist
//! - Anything else gets `401 Unauthorized` with a plain-text body, and the
//!   inner service is never called
//!
//! # Usage
//!
//! ```bash
//! ALLOWED_API_KEYS=key-one,key-two API_KEY_HEADER=X-API-Key cargo run
//! curl -H "X-API-Key: key-one" http://localhost:3000/api/v1/orders
//! ```
//!
//! # Path Matching Behavior
//!
//! Unprotected paths use **exact string matching** against
//! `request.uri().path()`:
//! - `/health` is unprotected, but `/health/` (trailing slash) is NOT
//! - `/health?verbose=1` IS unprotected (query strings are not part of the path)
//! - `/HEALTH` is NOT unprotected (case-sensitive)

use std::collections::HashSet;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, HeaderName};
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use subtle::{Choice, ConstantTimeEq};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Default header carrying the API key.
pub const DEFAULT_API_KEY_HEADER: &str = "x-api-key";

/// Body of every denial.
pub const UNAUTHORIZED_BODY: &str = "Unauthorized";

/// Static set of accepted API keys.
///
/// Membership checks compare the candidate against every key in constant
/// time, so response timing does not reveal how close a guess was.
#[derive(Clone, Default)]
pub struct Allowlist {
    keys: Arc<Vec<Vec<u8>>>,
}

impl Allowlist {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let unique: HashSet<String> = keys
            .into_iter()
            .map(Into::into)
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            keys: Arc::new(unique.into_iter().map(String::into_bytes).collect()),
        }
    }

    pub fn contains(&self, candidate: &str) -> bool {
        let candidate = candidate.as_bytes();
        let mut found = Choice::from(0);
        for key in self.keys.iter() {
            found |= key.as_slice().ct_eq(candidate);
        }
        found.into()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Debug for Allowlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the keys themselves
        f.debug_struct("Allowlist")
            .field("keys", &self.keys.len())
            .finish()
    }
}

/// API key authentication layer.
#[derive(Clone, Debug)]
pub struct ApiKeyAuth {
    header: HeaderName,
    allowlist: Allowlist,
    unprotected_paths: Arc<HashSet<String>>,
}

impl ApiKeyAuth {
    /// Create a new API key auth layer.
    ///
    /// # Arguments
    ///
    /// * `header` - Header the key is read from
    /// * `allowlist` - Accepted keys
    /// * `unprotected_paths` - Exact paths that skip authentication
    pub fn new<I, P>(header: HeaderName, allowlist: Allowlist, unprotected_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            header,
            allowlist,
            unprotected_paths: Arc::new(unprotected_paths.into_iter().map(Into::into).collect()),
        }
    }

    /// Build the layer from application configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the header name is not a valid HTTP header.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let header = HeaderName::try_from(config.api_key_header.as_str()).map_err(|e| {
            AppError::ConfigError(format!(
                "Invalid API_KEY_HEADER '{}': {e}",
                config.api_key_header
            ))
        })?;

        if config.allowed_api_keys.is_empty() {
            warn!("ALLOWED_API_KEYS is empty; every protected request will be rejected");
        }

        Ok(Self::new(
            header,
            Allowlist::new(config.allowed_api_keys.iter().cloned()),
            config.unprotected_paths.iter().cloned(),
        ))
    }

    /// Decide whether a request with this path and key may proceed.
    pub fn is_allowed(&self, path: &str, key: Option<&str>) -> bool {
        if self.unprotected_paths.contains(path) {
            return true;
        }
        key.is_some_and(|k| self.allowlist.contains(k))
    }

    /// Header name the key is read from.
    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

impl<S> Layer<S> for ApiKeyAuth {
    type Service = ApiKeyAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyAuthService {
            inner,
            auth: self.clone(),
        }
    }
}

/// API key authentication service wrapper.
#[derive(Clone)]
pub struct ApiKeyAuthService<S> {
    inner: S,
    auth: ApiKeyAuth,
}

impl<S> Service<Request<Body>> for ApiKeyAuthService<S>
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
        let path = req.uri().path();
        let key = extract_api_key(&req, &self.auth.header);

        if self.auth.is_allowed(path, key) {
            debug!(path, authenticated = key.is_some(), "Request allowed");
            // Take the service that was driven to readiness, leave a fresh clone behind
            let clone = self.inner.clone();
            let mut inner = std::mem::replace(&mut self.inner, clone);
            return Box::pin(async move { inner.call(req).await });
        }

        warn!(
            path,
            key_present = key.is_some(),
            "Rejected request without a valid API key"
        );
        Box::pin(async move { Ok(unauthorized_response()) })
    }
}

/// Read the API key from `header`, ignoring values that are not visible ASCII.
fn extract_api_key<'a, B>(req: &'a Request<B>, header: &HeaderName) -> Option<&'a str> {
    req.headers()
        .get(header)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

/// Build the 401 response.
fn unauthorized_response() -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        UNAUTHORIZED_BODY,
    )
        .into_response()
}
