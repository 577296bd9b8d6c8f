//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Security Configuration
//!
//! - `ALLOWED_API_KEYS`: Comma-separated allowlist. Empty means every protected path is denied.
//! - `API_KEY_HEADER`: Header carrying the key (default: `X-API-Key`)
//! - `UNPROTECTED_PATHS`: Comma-separated exact paths that skip the key check (default: `/health`)
//!
//! # Metrics
//!
//! - `SERVICE_NAME`: Metric name prefix (default: `api`)
//! - `API_VERSION_PREFIX`: Stripped before the `path_prefix` label is derived
//! - `METRICS_DUPLICATE_POLICY`: `reuse` (default) or `reject`
//! - `METRICS_PORT`: Separate Prometheus listener (default: 9090, 0 = `/metrics` route only)
//!
//! # Persistence Errors
//!
//! - `DB_ERROR_STATUS_MAP`: `code=status` pairs replacing the PostgreSQL defaults,
//!   e.g. `23505=409,23=400`

use std::env;
use std::net::SocketAddr;

use crate::db::StatusCodeMap;
use crate::error::{AppError, AppResult};
use crate::metrics::{DuplicatePolicy, validate_service_name};
use crate::middleware::total_count::DEFAULT_MAX_BODY_SIZE;

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Prefix of every metric name (default: "api")
    pub service_name: String,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Header carrying the API key (default: "X-API-Key")
    pub api_key_header: String,

    /// Keys accepted on protected paths.
    pub allowed_api_keys: Vec<String>,

    /// Exact paths that bypass authentication.
    /// Security note: Only add paths that don't expose sensitive data.
    pub unprotected_paths: Vec<String>,

    // =========================================================================
    // Metrics Configuration
    // =========================================================================
    /// API version prefix such as "/api/v1" (optional)
    pub api_version_prefix: Option<String>,

    /// What happens when a metric family is registered twice
    pub duplicate_metric_policy: DuplicatePolicy,

    /// Port for the Prometheus listener (default: 9090, 0 = disabled)
    pub metrics_port: u16,

    // =========================================================================
    // Response Rewriting
    // =========================================================================
    /// Largest JSON body buffered for list rewriting (default: 10MB)
    pub max_list_body_size: usize,

    /// Vendor error code → HTTP status lookup
    pub db_status_map: StatusCodeMap,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value is malformed
    /// (e.g., non-numeric PORT, unknown duplicate policy, bad status map).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "api".to_string()),

            // Security
            api_key_header: env::var("API_KEY_HEADER")
                .ok()
                .filter(|h| !h.trim().is_empty())
                .unwrap_or_else(|| "X-API-Key".to_string()),
            allowed_api_keys: Self::parse_list("ALLOWED_API_KEYS", ""),
            unprotected_paths: Self::parse_unprotected_paths(),

            // Metrics
            api_version_prefix: env::var("API_VERSION_PREFIX")
                .ok()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            duplicate_metric_policy: Self::parse_env(
                "METRICS_DUPLICATE_POLICY",
                DuplicatePolicy::Reuse,
            )?,
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,

            // Response rewriting
            max_list_body_size: Self::parse_env("MAX_LIST_BODY_SIZE", DEFAULT_MAX_BODY_SIZE)?,
            db_status_map: Self::parse_env("DB_ERROR_STATUS_MAP", StatusCodeMap::postgres())?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        validate_service_name(&self.service_name)?;

        if axum::http::HeaderName::try_from(self.api_key_header.as_str()).is_err() {
            return Err(AppError::ConfigError(format!(
                "API_KEY_HEADER '{}' is not a valid header name",
                self.api_key_header
            )));
        }

        if let Some(prefix) = &self.api_version_prefix
            && !prefix.starts_with('/')
        {
            return Err(AppError::ConfigError(format!(
                "API_VERSION_PREFIX '{prefix}' must start with '/'"
            )));
        }

        if self.max_list_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_LIST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if the separate Prometheus listener is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics listener address.
    ///
    /// Returns `None` if the listener is disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_enabled()
            .then(|| SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma-separated list, dropping blank entries.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        split_list(&env::var(name).unwrap_or_else(|_| default.to_string()))
    }

    /// Parse unprotected paths from environment variable.
    ///
    /// Default: "/health"
    /// Entries not starting with '/' can never match a request path and are dropped.
    fn parse_unprotected_paths() -> Vec<String> {
        Self::parse_list("UNPROTECTED_PATHS", "/health")
            .into_iter()
            .filter(|p| p.starts_with('/'))
            .collect()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            service_name: "api".to_string(),
            // Security
            api_key_header: "X-API-Key".to_string(),
            allowed_api_keys: vec![],
            unprotected_paths: vec!["/health".to_string()],
            // Metrics
            api_version_prefix: None,
            duplicate_metric_policy: DuplicatePolicy::Reuse,
            metrics_port: 9090,
            // Response rewriting
            max_list_body_size: DEFAULT_MAX_BODY_SIZE,
            db_status_map: StatusCodeMap::postgres(),
        }
    }
}
