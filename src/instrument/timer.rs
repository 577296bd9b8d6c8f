//! Per-call latency timing.
//!
//! A [`CallTimer`] is bound to one call site (`<namespace>_<name>`) and records
//! exactly one observation per invocation, whether the call returns `Ok`,
//! returns `Err`, panics, or is dropped mid-flight.

use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use metrics::Histogram;
use tower::{Layer, Service};

use crate::metrics::{HistogramFamily, names};

/// Times calls for a single call site.
#[derive(Clone)]
pub struct CallTimer {
    label: Arc<str>,
    histogram: Histogram,
}

impl CallTimer {
    /// Bind a timer to `<short namespace>_<name>` in `family`.
    ///
    /// `namespace` may be a full module path such as `my_service::orders`;
    /// only its last segment is used.
    pub fn new(family: &HistogramFamily, namespace: &str, name: &str) -> Self {
        let label = call_label(namespace, name);
        let histogram = family.histogram(&[(names::CALL_LABEL, label.clone())]);
        Self {
            label: Arc::from(label),
            histogram,
        }
    }

    /// The `call` label value observations are recorded under.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run a synchronous closure and record its duration.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let _observation = self.start();
        f()
    }

    /// Await a future and record its duration.
    pub async fn time_future<F: Future>(&self, fut: F) -> F::Output {
        let _observation = self.start();
        fut.await
    }

    fn start(&self) -> Observation {
        Observation {
            histogram: self.histogram.clone(),
            started: Instant::now(),
        }
    }
}

impl std::fmt::Debug for CallTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallTimer")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Records elapsed time when dropped.
struct Observation {
    histogram: Histogram,
    started: Instant,
}

impl Drop for Observation {
    fn drop(&mut self) {
        self.histogram.record(self.started.elapsed().as_secs_f64());
    }
}

/// Short name of a namespace path: the segment after the last `::` or `.`.
pub fn short_name(namespace: &str) -> &str {
    namespace
        .rsplit("::")
        .next()
        .and_then(|segment| segment.rsplit('.').next())
        .unwrap_or(namespace)
}

/// Label value for a call site.
pub fn call_label(namespace: &str, name: &str) -> String {
    format!("{}_{name}", short_name(namespace))
}

/// Tower layer applying a [`CallTimer`] to every request of a service.
///
/// Used to instrument axum method routers without changing their signature.
#[derive(Clone)]
pub struct CallTimerLayer {
    timer: CallTimer,
}

impl CallTimerLayer {
    pub fn new(timer: CallTimer) -> Self {
        Self { timer }
    }
}

impl<S> Layer<S> for CallTimerLayer {
    type Service = CallTimerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CallTimerService {
            inner,
            timer: self.timer.clone(),
        }
    }
}

/// Service wrapper produced by [`CallTimerLayer`].
#[derive(Clone)]
pub struct CallTimerService<S> {
    inner: S,
    timer: CallTimer,
}

impl<S> Service<Request<Body>> for CallTimerService<S>
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
        let timer = self.timer.clone();
        let fut = self.inner.call(req);

        Box::pin(async move { timer.time_future(fut).await })
    }
}
