//! Paginated list shapes.
//!
//! A data-access layer that knows the total row count returns a
//! [`ListEnvelope`]; [`TotalCountLayer`](crate::middleware::TotalCountLayer)
//! turns it into a bare array plus `X-Total-Count` on the way out. Handlers
//! that already hold both parts can return a [`ListResponse`] directly.

use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};

use crate::middleware::TOTAL_COUNT_HEADER;

/// Serializes as `[{"x_total_count": N}, [items...]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEnvelope<T> {
    pub total_count: u64,
    pub items: Vec<T>,
}

impl<T> ListEnvelope<T> {
    pub fn new(total_count: u64, items: Vec<T>) -> Self {
        Self { total_count, items }
    }
}

#[derive(Serialize)]
struct CountHeader {
    x_total_count: u64,
}

impl<T: Serialize> Serialize for ListEnvelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&CountHeader {
            x_total_count: self.total_count,
        })?;
        tuple.serialize_element(&self.items)?;
        tuple.end()
    }
}

impl<T: Serialize> IntoResponse for ListEnvelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// A list response with the count already in `X-Total-Count`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListResponse<T> {
    pub total_count: u64,
    pub items: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(total_count: u64, items: Vec<T>) -> Self {
        Self { total_count, items }
    }
}

impl<T> From<ListEnvelope<T>> for ListResponse<T> {
    fn from(envelope: ListEnvelope<T>) -> Self {
        Self::new(envelope.total_count, envelope.items)
    }
}

impl<T: Serialize> IntoResponse for ListResponse<T> {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::OK, Json(self.items)).into_response();
        response
            .headers_mut()
            .insert(TOTAL_COUNT_HEADER, HeaderValue::from(self.total_count));
        response
    }
}
