//! Tower integration for retry.

use crate::config::RetryConfig;
use crate::retry::Retry;
use fortify_core::ResilienceError;
use futures::future::BoxFuture;
use std::error::Error;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service, ServiceExt};

/// Retries failed requests to a tower service.
///
/// Requests must be `Clone` since every attempt sends a fresh copy. Each
/// attempt runs on its own clone of the inner service and waits for it to
/// become ready.
#[derive(Clone)]
pub struct RetryLayer {
    retry: Arc<Retry>,
}

impl RetryLayer {
    /// Uses an existing retry.
    pub fn new(retry: Arc<Retry>) -> Self {
        Self { retry }
    }

    /// Creates a fresh retry from `config`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fortify_retry::{RetryConfig, RetryLayer};
    /// use std::time::Duration;
    ///
    /// let layer = RetryLayer::from_config(
    ///     "backend",
    ///     RetryConfig::builder()
    ///         .max_attempts(5)
    ///         .exponential_backoff(Duration::from_millis(100))
    ///         .build(),
    /// );
    /// assert_eq!(layer.retry().config().max_attempts(), 5);
    /// ```
    pub fn from_config(name: impl Into<String>, config: RetryConfig) -> Self {
        Self::new(Arc::new(Retry::new(name, config)))
    }

    /// The retry shared by every service this layer produces.
    pub fn retry(&self) -> &Arc<Retry> {
        &self.retry
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            retry: Arc::clone(&self.retry),
        }
    }
}

/// Service produced by [`RetryLayer`].
#[derive(Clone)]
pub struct RetryService<S> {
    inner: S,
    retry: Arc<Retry>,
}

impl<S, Request, E> Service<Request> for RetryService<S>
where
    S: Service<Request, Error = ResilienceError<E>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    E: Error + Send + 'static,
    Request: Clone + Send + 'static,
{
    type Response = S::Response;
    type Error = ResilienceError<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let retry = Arc::clone(&self.retry);
        let inner = self.inner.clone();

        Box::pin(async move {
            retry
                .call(move || inner.clone().oneshot(request.clone()))
                .await
        })
    }
}
