//! HTTP middleware shared by every service.
//!
//! - **API Key Authentication**: static allowlist, constant-time comparison
//! - **Request Duration**: `<service>_http_duration_seconds{path_prefix,method,status}`
//! - **Total Count**: moves list counts from the body into `X-Total-Count`
//!
//! # Architecture
//!
//! ```text
//! Request → Trace → Duration → Auth → Total Count → Handler
//!                      ↓         ↓          ↓
//!                  histogram  401 Unauth  X-Total-Count header
//! ```
//!
//! Duration sits outside Auth so rejected requests are measured with their
//! real `401` status.

pub mod auth;
pub mod duration;
pub mod total_count;

pub use auth::{Allowlist, ApiKeyAuth, DEFAULT_API_KEY_HEADER, UNAUTHORIZED_BODY};
pub use duration::{RequestDurationLayer, RequestStart, path_prefix};
pub use total_count::{TOTAL_COUNT_HEADER, TotalCountLayer, rewrite_list_body};
