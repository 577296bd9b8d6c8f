mod health;

pub use health::{PROMETHEUS_CONTENT_TYPE, health_check, metrics};
