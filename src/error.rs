use thiserror::Error;

/// Setup-time error types.
///
/// Nothing here is produced while serving a request: authentication denials
/// are plain 401 responses and persistence errors are translated by
/// [`DbErrorTranslator`](crate::db::DbErrorTranslator). These variants surface
/// while loading configuration or wiring metrics, and the binary treats them
/// as fatal.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics setup failed: {0}")]
    MetricsError(String),

    /// A histogram family with this name is already registered and the
    /// registry was built with [`DuplicatePolicy::Reject`](crate::metrics::DuplicatePolicy::Reject).
    #[error("Metric already registered: {0}")]
    DuplicateMetric(String),
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
