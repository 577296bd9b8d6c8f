//! Prometheus metrics registry for latency instrumentation.
//!
//! Rather than installing a process-global recorder, the registry owns its own
//! [`PrometheusRecorder`] and is passed explicitly to the components that record
//! into it. Building a second registry, or asking for the same family twice,
//! never crashes the process.
//!
//! # Available Metrics
//!
//! ## Histograms
//! - `<service>_call_duration_seconds` - Duration of instrumented calls (label: call)
//! - `<service>_http_duration_seconds` - HTTP request duration (labels: path_prefix, method, status)
//!
//! # Usage
//!
//! ```rust,ignore
//! use api_commons::metrics::{DuplicatePolicy, MetricsRegistry};
//!
//! let registry = MetricsRegistry::new("orders", DuplicatePolicy::Reuse)?;
//! let calls = registry.call_durations()?;
//! calls.histogram(&[(names::CALL_LABEL, "orders_list".to_string())]).record(0.012);
//! println!("{}", registry.render());
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use metrics::{Histogram, Label, Unit, describe_histogram, histogram, with_local_recorder};
use metrics_exporter_prometheus::{
    ExporterFuture, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

/// Metric names and label keys as constants for consistency.
pub mod names {
    pub const CALL_DURATION_SECONDS: &str = "call_duration_seconds";
    pub const HTTP_DURATION_SECONDS: &str = "http_duration_seconds";

    pub const CALL_LABEL: &str = "call";
    pub const PATH_PREFIX_LABEL: &str = "path_prefix";
    pub const METHOD_LABEL: &str = "method";
    pub const STATUS_LABEL: &str = "status";
}

/// Histogram buckets for every `*_duration_seconds` family.
const DURATION_BUCKETS: [f64; 12] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// What to do when a histogram family name is registered a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Hand back the existing family (get-or-create).
    #[default]
    Reuse,
    /// Fail with [`AppError::DuplicateMetric`].
    Reject,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reuse" => Ok(Self::Reuse),
            "reject" => Ok(Self::Reject),
            other => Err(format!("expected 'reuse' or 'reject', got '{other}'")),
        }
    }
}

/// A named histogram whose label sets are created on demand.
///
/// Cloning is cheap; all clones record into the same recorder.
#[derive(Clone)]
pub struct HistogramFamily {
    name: Arc<str>,
    recorder: Arc<PrometheusRecorder>,
}

impl HistogramFamily {
    /// Full metric name, including the service prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get (or create) the histogram for one label set.
    ///
    /// Callers should resolve handles once and keep them: label values must be
    /// derived from static properties, never from request payloads.
    pub fn histogram(&self, labels: &[(&'static str, String)]) -> Histogram {
        let name = self.name.to_string();
        let labels: Vec<Label> = labels
            .iter()
            .map(|(key, value)| Label::new(*key, value.clone()))
            .collect();
        with_local_recorder(self.recorder.as_ref(), || histogram!(name, labels))
    }
}

impl std::fmt::Debug for HistogramFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistogramFamily")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registry of histogram families backed by one Prometheus recorder.
pub struct MetricsRegistry {
    service: String,
    policy: DuplicatePolicy,
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
    families: Mutex<HashMap<String, HistogramFamily>>,
}

impl MetricsRegistry {
    /// Create a registry whose metrics are only reachable through [`render`](Self::render).
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` for an invalid service name and
    /// `AppError::MetricsError` if the recorder cannot be configured.
    pub fn new(service: &str, policy: DuplicatePolicy) -> AppResult<Self> {
        validate_service_name(service)?;
        let recorder = builder()?.build_recorder();
        Ok(Self::from_recorder(service, policy, recorder))
    }

    /// Create a registry and the exporter future serving it on `addr`.
    ///
    /// The future must be spawned on a Tokio runtime by the caller.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new), plus listener setup failures.
    pub fn with_http_listener(
        service: &str,
        policy: DuplicatePolicy,
        addr: SocketAddr,
    ) -> AppResult<(Self, ExporterFuture)> {
        validate_service_name(service)?;
        let (recorder, exporter) = builder()?
            .with_http_listener(addr)
            .build()
            .map_err(|e| AppError::MetricsError(format!("Failed to build Prometheus exporter: {e}")))?;

        info!(addr = %addr, "Prometheus metrics endpoint configured");
        Ok((Self::from_recorder(service, policy, recorder), exporter))
    }

    fn from_recorder(service: &str, policy: DuplicatePolicy, recorder: PrometheusRecorder) -> Self {
        let handle = recorder.handle();
        Self {
            service: service.to_string(),
            policy,
            recorder: Arc::new(recorder),
            handle,
            families: Mutex::new(HashMap::new()),
        }
    }

    /// Service name used as the metric prefix.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Get or create the family `<service>_<suffix>`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DuplicateMetric` when the family already exists and
    /// the policy is [`DuplicatePolicy::Reject`].
    pub fn histogram_family(&self, suffix: &str, help: &'static str) -> AppResult<HistogramFamily> {
        let name = format!("{}_{suffix}", self.service);
        let mut families = self.families.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = families.get(&name) {
            return match self.policy {
                DuplicatePolicy::Reuse => {
                    debug!(metric = %name, "Reusing registered histogram family");
                    Ok(existing.clone())
                }
                DuplicatePolicy::Reject => Err(AppError::DuplicateMetric(name)),
            };
        }

        let described = name.clone();
        with_local_recorder(self.recorder.as_ref(), || {
            describe_histogram!(described, Unit::Seconds, help);
        });

        let family = HistogramFamily {
            name: Arc::from(name.as_str()),
            recorder: self.recorder.clone(),
        };
        families.insert(name.clone(), family.clone());
        debug!(metric = %name, "Registered histogram family");
        Ok(family)
    }

    /// Family for instrumented call durations.
    pub fn call_durations(&self) -> AppResult<HistogramFamily> {
        self.histogram_family(
            names::CALL_DURATION_SECONDS,
            "Duration of instrumented calls in seconds",
        )
    }

    /// Family for whole HTTP request durations.
    pub fn http_durations(&self) -> AppResult<HistogramFamily> {
        self.histogram_family(
            names::HTTP_DURATION_SECONDS,
            "HTTP request duration in seconds",
        )
    }

    /// Render every family in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("service", &self.service)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn builder() -> AppResult<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &DURATION_BUCKETS,
        )
        .map_err(|e| AppError::MetricsError(format!("Invalid histogram buckets: {e}")))
}

/// Service names become metric name prefixes, so they follow Prometheus rules.
pub fn validate_service_name(service: &str) -> AppResult<()> {
    let mut chars = service.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(AppError::ConfigError(format!(
            "Invalid service name '{service}': use letters, digits and underscores"
        )))
    }
}

/// Test support: read the `_count` sample of a histogram series from
/// rendered output.
///
/// Every fragment in `labels` (e.g. `call="orders_list"`) must appear in the
/// series' label set. Public only so integration tests can reach it.
#[doc(hidden)]
pub fn sample_count(rendered: &str, metric: &str, labels: &[&str]) -> Option<u64> {
    let prefix = format!("{metric}_count{{");
    rendered
        .lines()
        .filter(|line| line.starts_with(&prefix))
        .find(|line| labels.iter().all(|label| line.contains(label)))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}
