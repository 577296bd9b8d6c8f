//! Database error translation.
//!
//! [`DbErrorTranslator`] turns a persistence error into a JSON error response
//! after rolling back the request's session. The status comes from a
//! [`StatusCodeMap`] keyed by vendor error code (SQLSTATE for PostgreSQL).

pub mod status_map;
pub mod translator;

pub use status_map::{CLASS_WIDTH, StatusCodeMap, error_class};
pub use translator::{
    DatabaseFailure, DbErrorResponse, DbErrorTranslator, ErrorBody, Session, collapse_newlines,
};
