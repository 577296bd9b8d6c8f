//! Type-erased async operations that can be registered in a namespace.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::Instrument;
use super::timer::CallTimer;

type BoxFuture<O> = Pin<Box<dyn Future<Output = O> + Send>>;

/// An async function `I -> O` behind a cheap, clonable handle.
///
/// Business-logic functions (data access, service calls) are registered as
/// operations so they can be timed the same way HTTP endpoints are.
pub struct Operation<I, O> {
    f: Arc<dyn Fn(I) -> BoxFuture<O> + Send + Sync>,
}

impl<I, O> Clone for Operation<I, O> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone() }
    }
}

impl<I, O> Operation<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
    {
        Self {
            f: Arc::new(move |input| -> BoxFuture<O> { Box::pin(f(input)) }),
        }
    }

    /// Invoke the operation.
    pub async fn call(&self, input: I) -> O {
        (self.f)(input).await
    }
}

impl<I, O> Instrument for Operation<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn instrument(self, timer: CallTimer) -> Self {
        let inner = self.f;
        Self {
            f: Arc::new(move |input| -> BoxFuture<O> {
                let fut = inner(input);
                let timer = timer.clone();
                Box::pin(async move { timer.time_future(fut).await })
            }),
        }
    }
}

impl<I, O> std::fmt::Debug for Operation<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation").finish_non_exhaustive()
    }
}
