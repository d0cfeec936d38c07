//! Tower integration for the semaphore bulkhead.

use crate::config::BulkheadConfig;
use crate::semaphore::Bulkhead;
use fortify_core::ResilienceError;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Limits concurrent calls to a tower service with a shared [`Bulkhead`].
///
/// Every service produced by one layer draws from the same permits.
#[derive(Clone)]
pub struct BulkheadLayer {
    bulkhead: Arc<Bulkhead>,
}

impl BulkheadLayer {
    /// Uses an existing bulkhead.
    pub fn new(bulkhead: Arc<Bulkhead>) -> Self {
        Self { bulkhead }
    }

    /// Creates a fresh bulkhead from `config`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fortify_bulkhead::{BulkheadConfig, BulkheadLayer};
    /// use std::time::Duration;
    ///
    /// let layer = BulkheadLayer::from_config(
    ///     "inventory",
    ///     BulkheadConfig::builder()
    ///         .max_concurrent_calls(10)
    ///         .max_wait_duration(Duration::from_millis(50))
    ///         .build(),
    /// );
    /// assert_eq!(layer.bulkhead().metrics().available_concurrent_calls, 10);
    /// ```
    pub fn from_config(name: impl Into<String>, config: BulkheadConfig) -> Self {
        Self::new(Arc::new(Bulkhead::new(name, config)))
    }

    /// The bulkhead shared by every service this layer produces.
    pub fn bulkhead(&self) -> &Arc<Bulkhead> {
        &self.bulkhead
    }
}

impl<S> Layer<S> for BulkheadLayer {
    type Service = BulkheadService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BulkheadService {
            inner,
            bulkhead: Arc::clone(&self.bulkhead),
        }
    }
}

/// Service produced by [`BulkheadLayer`].
#[derive(Clone)]
pub struct BulkheadService<S> {
    inner: S,
    bulkhead: Arc<Bulkhead>,
}

impl<S, Request, E> Service<Request> for BulkheadService<S>
where
    S: Service<Request, Error = ResilienceError<E>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    E: Send + 'static,
    Request: Send + 'static,
{
    type Response = S::Response;
    type Error = ResilienceError<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let bulkhead = Arc::clone(&self.bulkhead);
        let mut inner = self.inner.clone();

        Box::pin(async move { bulkhead.call(inner.call(request)).await })
    }
}
