use axum::Router;
use axum::routing::MethodRouter;

use super::Instrument;
use super::timer::{CallTimer, CallTimerLayer};

/// An axum method router bound to the path it is served on.
pub struct Endpoint<S = ()> {
    path: String,
    method_router: MethodRouter<S>,
}

impl<S> Endpoint<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(path: impl Into<String>, method_router: MethodRouter<S>) -> Self {
        Self {
            path: path.into(),
            method_router,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Add this endpoint to `router`.
    pub fn mount(self, router: Router<S>) -> Router<S> {
        router.route(&self.path, self.method_router)
    }
}

impl<S> Instrument for MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn instrument(self, timer: CallTimer) -> Self {
        self.layer(CallTimerLayer::new(timer))
    }
}

impl<S> Instrument for Endpoint<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn instrument(self, timer: CallTimer) -> Self {
        Self {
            path: self.path,
            method_router: self.method_router.instrument(timer),
        }
    }
}
