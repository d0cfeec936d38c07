//! Tower integration for the rate limiter.

use crate::config::RateLimiterConfig;
use crate::limiter::RateLimiter;
use fortify_core::ResilienceError;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Throttles a tower service with a shared [`RateLimiter`].
#[derive(Clone)]
pub struct RateLimiterLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimiterLayer {
    /// Uses an existing limiter.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    /// Creates a fresh limiter from `config`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fortify_ratelimiter::{RateLimiterConfig, RateLimiterLayer};
    /// use std::time::Duration;
    ///
    /// let layer = RateLimiterLayer::from_config(
    ///     "search",
    ///     RateLimiterConfig::builder()
    ///         .limit_for_period(100)
    ///         .limit_refresh_period(Duration::from_secs(1))
    ///         .build(),
    /// );
    /// assert_eq!(layer.limiter().limit_for_period(), 100);
    /// ```
    pub fn from_config(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        Self::new(Arc::new(RateLimiter::new(name, config)))
    }

    /// The limiter shared by every service this layer produces.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

impl<S> Layer<S> for RateLimiterLayer {
    type Service = RateLimiterService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimiterService {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

/// Service produced by [`RateLimiterLayer`].
#[derive(Clone)]
pub struct RateLimiterService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S, Request, E> Service<Request> for RateLimiterService<S>
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
        let mut inner = self.inner.clone();

        Box::pin(async move {
            limiter.acquire_permission_async().await?;
            inner.call(request).await
        })
    }
}
