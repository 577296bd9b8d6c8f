//! Shared application state for Axum handlers.
//!
//! Everything here is built once at startup and read-only afterwards:
//!
//! - **Configuration**: Runtime configuration access
//! - **Metrics**: The registry every histogram family is created from
//! - **DB Errors**: Translator for persistence failures caught by handlers
//!
//! Host services embed `AppState` in their own state (or use it directly)
//! and reach the translator through `state.db_errors`.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::db::DbErrorTranslator;
use crate::metrics::MetricsRegistry;

/// Shared application state for Axum handlers.
///
/// This struct is cloned for each request handler. All internal data
/// is wrapped in `Arc` for efficient sharing.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Registry owning every histogram family of this service
    pub metrics: Arc<MetricsRegistry>,
    /// Persistence error → HTTP response translation
    pub db_errors: Arc<DbErrorTranslator>,
    /// Timestamp when the application started
    pub started_at: Instant,
}

impl AppState {
    /// Create application state from configuration and an existing registry.
    ///
    /// The translator uses `config.db_status_map`.
    pub fn new(config: Config, metrics: MetricsRegistry) -> Self {
        let db_errors = DbErrorTranslator::new(config.db_status_map.clone());
        Self {
            config: Arc::new(config),
            metrics: Arc::new(metrics),
            db_errors: Arc::new(db_errors),
            started_at: Instant::now(),
        }
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
