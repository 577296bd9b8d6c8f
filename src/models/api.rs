use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "ok" when the process can answer
    pub status: String,
    /// Service name, also the metric prefix
    pub service: String,
    /// Crate version
    pub version: String,
    /// Seconds since the application state was built
    pub uptime_seconds: u64,
}

impl HealthResponse {
    pub fn ok(service: impl Into<String>, uptime_seconds: u64) -> Self {
        Self {
            status: "ok".to_string(),
            service: service.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds,
        }
    }
}
