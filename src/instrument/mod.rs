//! Call-site latency instrumentation.
//!
//! - [`CallTimer`]: times one call site into `<service>_call_duration_seconds{call}`
//! - [`Namespace`]: explicit table of named operations, instrumented in place
//! - [`Endpoint`] / [`Operation`]: the operation types a namespace can hold
//!
//! Wrapping is composition: an instrumented operation has the same type and
//! signature as the original and returns exactly what the original returns.

mod endpoint;
mod namespace;
mod operation;
pub mod timer;

pub use endpoint::Endpoint;
pub use namespace::{Namespace, instrument_all};
pub use operation::Operation;
pub use timer::{CallTimer, CallTimerLayer, CallTimerService};

/// An operation that can be wrapped with a [`CallTimer`] without changing its type.
pub trait Instrument: Sized {
    /// Return the timed version of `self`.
    fn instrument(self, timer: CallTimer) -> Self;
}
