//! Tower integration for the time limiter.

use crate::config::TimeLimiterConfig;
use crate::limiter::TimeLimiter;
use fortify_core::ResilienceError;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Applies a deadline to every request to a tower service.
#[derive(Clone)]
pub struct TimeLimiterLayer {
    limiter: Arc<TimeLimiter>,
}

impl TimeLimiterLayer {
    /// Uses an existing time limiter.
    pub fn new(limiter: Arc<TimeLimiter>) -> Self {
        Self { limiter }
    }

    /// Creates a fresh time limiter from `config`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fortify_timelimiter::{TimeLimiterConfig, TimeLimiterLayer};
    /// use std::time::Duration;
    ///
    /// let layer = TimeLimiterLayer::from_config(
    ///     "slow-backend",
    ///     TimeLimiterConfig::builder()
    ///         .timeout_duration(Duration::from_millis(250))
    ///         .build(),
    /// );
    /// assert_eq!(layer.limiter().config().timeout_duration(), Duration::from_millis(250));
    /// ```
    pub fn from_config(name: impl Into<String>, config: TimeLimiterConfig) -> Self {
        Self::new(Arc::new(TimeLimiter::new(name, config)))
    }

    /// The time limiter shared by every service this layer produces.
    pub fn limiter(&self) -> &Arc<TimeLimiter> {
        &self.limiter
    }
}

impl<S> Layer<S> for TimeLimiterLayer {
    type Service = TimeLimiterService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeLimiterService {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

/// Service produced by [`TimeLimiterLayer`].
#[derive(Clone)]
pub struct TimeLimiterService<S> {
    inner: S,
    limiter: Arc<TimeLimiter>,
}

impl<S, Request, E> Service<Request> for TimeLimiterService<S>
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
        let limiter = Arc::clone(&self.limiter);
        let future = self.inner.call(request);

        Box::pin(async move { limiter.call(future).await })
    }
}
