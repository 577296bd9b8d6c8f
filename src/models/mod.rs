mod api;
mod list;

pub use api::HealthResponse;
pub use list::{ListEnvelope, ListResponse};
