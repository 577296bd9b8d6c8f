//! Vendor error code → HTTP status lookup.

use std::collections::HashMap;
use std::str::FromStr;

use axum::http::StatusCode;

/// Width of the error-class prefix of a vendor code (SQLSTATE class).
pub const CLASS_WIDTH: usize = 2;

/// Ordered lookup: exact code, then class prefix, then the default (500).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCodeMap {
    codes: HashMap<String, StatusCode>,
    classes: HashMap<String, StatusCode>,
    default: StatusCode,
}

impl StatusCodeMap {
    /// An empty map: every code resolves to 500.
    pub fn new() -> Self {
        Self {
            codes: HashMap::new(),
            classes: HashMap::new(),
            default: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Mappings for common PostgreSQL SQLSTATE codes.
    ///
    /// - `23505` unique violation, `23503` foreign key violation → 409
    /// - class `23` other integrity constraint violations → 400
    /// - class `22` data exceptions → 400
    /// - class `40` transaction rollback (serialization, deadlock) → 503
    pub fn postgres() -> Self {
        Self::new()
            .with_code("23505", StatusCode::CONFLICT)
            .with_code("23503", StatusCode::CONFLICT)
            .with_class("23", StatusCode::BAD_REQUEST)
            .with_class("22", StatusCode::BAD_REQUEST)
            .with_class("40", StatusCode::SERVICE_UNAVAILABLE)
    }

    pub fn with_code(mut self, code: impl Into<String>, status: StatusCode) -> Self {
        self.codes.insert(code.into(), status);
        self
    }

    pub fn with_class(mut self, class: impl Into<String>, status: StatusCode) -> Self {
        self.classes.insert(class.into(), status);
        self
    }

    /// Resolve the status for a vendor code. Exact matches win over classes.
    pub fn status_for(&self, code: &str) -> StatusCode {
        if let Some(status) = self.codes.get(code) {
            return *status;
        }
        error_class(code)
            .and_then(|class| self.classes.get(class))
            .copied()
            .unwrap_or(self.default)
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty() && self.classes.is_empty()
    }
}

impl Default for StatusCodeMap {
    fn default() -> Self {
        Self::postgres()
    }
}

/// Parse `"23505=409,23=400"`.
///
/// Keys exactly [`CLASS_WIDTH`] characters long are classes; longer keys are
/// exact codes.
impl FromStr for StatusCodeMap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut map = Self::new();

        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (code, status) = entry
                .split_once('=')
                .ok_or_else(|| format!("expected 'code=status', got '{entry}'"))?;
            let code = code.trim();

            let status = status
                .trim()
                .parse::<u16>()
                .ok()
                .and_then(|s| StatusCode::from_u16(s).ok())
                .ok_or_else(|| format!("invalid HTTP status in '{entry}'"))?;

            map = match code.len() {
                CLASS_WIDTH => map.with_class(code, status),
                n if n > CLASS_WIDTH => map.with_code(code, status),
                _ => return Err(format!("code '{code}' is shorter than an error class")),
            };
        }

        Ok(map)
    }
}

/// Error-class prefix of a vendor code.
pub fn error_class(code: &str) -> Option<&str> {
    code.get(..CLASS_WIDTH)
}
