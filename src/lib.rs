//! # API Commons
//!
//! Cross-cutting request handling shared by a family of axum services:
//!
//! - **Authentication**: static API-key allowlist with constant-time checks
//! - **Latency**: call-site and whole-request Prometheus histograms
//! - **Persistence errors**: vendor error codes mapped to JSON error responses
//! - **Pagination**: list counts moved into an `X-Total-Count` header
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Trace → Duration → Auth → Total Count)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Instrumented namespaces (CallTimer per endpoint)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Host handlers  ──persistence error──▶  DbErrorTranslator   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  MetricsRegistry (injected Prometheus recorder)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use api_commons::{AppState, Config, MetricsRegistry, build_router};
//! use axum::Router;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let registry = MetricsRegistry::new(&config.service_name, config.duplicate_metric_policy)?;
//!
//!     let state = AppState::new(config, registry);
//!     let app = build_router(state, Router::new())?;
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Security Configuration
//!
//! ```bash
//! ALLOWED_API_KEYS=key-one,key-two UNPROTECTED_PATHS=/health,/metrics cargo run
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod instrument;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use db::{DbErrorTranslator, StatusCodeMap};
pub use error::{AppError, AppResult};
pub use instrument::{CallTimer, Endpoint, Instrument, Namespace, Operation, instrument_all};
pub use crate::metrics::{DuplicatePolicy, MetricsRegistry};
pub use models::{ListEnvelope, ListResponse};
pub use routes::build_router;
pub use state::AppState;
