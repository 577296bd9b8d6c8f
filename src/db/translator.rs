//! Translation of persistence-layer errors into HTTP responses.
//!
//! Every translation rolls back the caller's session first, whether or not
//! the error is recognized, so the connection goes back to the pool clean.
//!
//! ```rust,ignore
//! async fn create_order(State(state): State<AppState>, Json(order): Json<NewOrder>) -> Response {
//!     let mut conn = state.pool.acquire().await?;
//!     match insert_order(&mut conn, &order).await {
//!         Ok(created) => Json(created).into_response(),
//!         Err(e) => state.db_errors.translate(&e, &mut *conn).await.into_response(),
//!     }
//! }
//! ```
//!
//! With sqlx, pass a plain pooled connection (`&mut *conn`) that ran an
//! explicit `BEGIN`. Do not pass `&mut *tx` from a `sqlx::Transaction`: the
//! raw `ROLLBACK` issued here is invisible to sqlx's transaction tracking,
//! so the `Transaction` still rolls back again on drop. For a
//! `Transaction`, call `tx.rollback()` and build the response with
//! [`DbErrorTranslator::classify`] instead.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::status_map::StatusCodeMap;

/// A persistence error that may carry a vendor error code.
pub trait DatabaseFailure: fmt::Display {
    /// Vendor-specific code (SQLSTATE for PostgreSQL), if the error has one.
    fn vendor_code(&self) -> Option<Cow<'_, str>>;

    /// Human-readable message reported by the database.
    fn vendor_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }
}

/// A transactional session that can be rolled back in place.
pub trait Session: Send {
    type Error: fmt::Display;

    fn rollback(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// JSON body of every translated error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Status and body produced by [`DbErrorTranslator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbErrorResponse {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl IntoResponse for DbErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Maps persistence errors to `{"error": "..."}` responses.
#[derive(Debug, Clone, Default)]
pub struct DbErrorTranslator {
    status_map: StatusCodeMap,
}

impl DbErrorTranslator {
    pub fn new(status_map: StatusCodeMap) -> Self {
        Self { status_map }
    }

    pub fn status_map(&self) -> &StatusCodeMap {
        &self.status_map
    }

    /// Log `err`, roll back `session`, and build the error response.
    ///
    /// A failed rollback is logged and does not change the response.
    pub async fn translate<E, S>(&self, err: &E, session: &mut S) -> DbErrorResponse
    where
        E: DatabaseFailure + ?Sized,
        S: Session,
    {
        let response = self.classify(err);
        error!(
            error = %err,
            status = response.status.as_u16(),
            "Database error, rolling back session"
        );

        if let Err(rollback_err) = session.rollback().await {
            error!(error = %rollback_err, "Session rollback failed");
        }

        response
    }

    /// Build the response for `err` without touching any session.
    pub fn classify<E>(&self, err: &E) -> DbErrorResponse
    where
        E: DatabaseFailure + ?Sized,
    {
        let (status, message) = match err.vendor_code() {
            Some(code) => (self.status_map.status_for(&code), err.vendor_message()),
            None => (StatusCode::INTERNAL_SERVER_ERROR, Cow::Owned(err.to_string())),
        };

        DbErrorResponse {
            status,
            body: ErrorBody {
                error: collapse_newlines(&message),
            },
        }
    }
}

/// Replace line breaks with single spaces.
pub fn collapse_newlines(message: &str) -> String {
    message.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

impl DatabaseFailure for sqlx::Error {
    fn vendor_code(&self) -> Option<Cow<'_, str>> {
        self.as_database_error().and_then(|e| e.code())
    }

    fn vendor_message(&self) -> Cow<'_, str> {
        match self.as_database_error() {
            Some(e) => Cow::Borrowed(e.message()),
            None => Cow::Owned(self.to_string()),
        }
    }
}

/// Issues a raw `ROLLBACK` on a plain connection.
///
/// sqlx does not see this statement, so a connection borrowed out of a
/// `sqlx::Transaction` is left with stale transaction depth. Roll those
/// back through `Transaction::rollback` instead.
impl Session for sqlx::PgConnection {
    type Error = sqlx::Error;

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        sqlx::query("ROLLBACK").execute(self).await.map(|_| ())
    }
}
