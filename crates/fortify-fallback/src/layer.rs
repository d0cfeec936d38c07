//! Tower integration for fallbacks.

use crate::fallback::Fallback;
use fortify_core::ResilienceError;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Resolves failed responses of a tower service through a [`Fallback`].
pub struct FallbackLayer<T, E> {
    fallback: Arc<Fallback<T, E>>,
}

impl<T, E> FallbackLayer<T, E> {
    /// Uses an existing fallback.
    pub fn new(fallback: Arc<Fallback<T, E>>) -> Self {
        Self { fallback }
    }

    /// Wraps a freshly built fallback.
    ///
    /// # Examples
    ///
    /// ```
    /// use fortify_core::ErrorKind;
    /// use fortify_fallback::{Fallback, FallbackLayer};
    ///
    /// let layer = FallbackLayer::from_fallback(
    ///     Fallback::<String, std::io::Error>::builder("catalog")
    ///         .on_kind(ErrorKind::CallNotPermitted)
    ///         .value("cached catalog".to_string())
    ///         .build(),
    /// );
    /// assert_eq!(layer.fallback().len(), 1);
    /// ```
    pub fn from_fallback(fallback: Fallback<T, E>) -> Self {
        Self::new(Arc::new(fallback))
    }

    /// The fallback shared by every service this layer produces.
    pub fn fallback(&self) -> &Arc<Fallback<T, E>> {
        &self.fallback
    }
}

impl<T, E> Clone for FallbackLayer<T, E> {
    fn clone(&self) -> Self {
        Self {
            fallback: Arc::clone(&self.fallback),
        }
    }
}

impl<S, T, E> Layer<S> for FallbackLayer<T, E> {
    type Service = FallbackService<S, T, E>;

    fn layer(&self, inner: S) -> Self::Service {
        FallbackService {
            inner,
            fallback: Arc::clone(&self.fallback),
        }
    }
}

/// Service produced by [`FallbackLayer`].
pub struct FallbackService<S, T, E> {
    inner: S,
    fallback: Arc<Fallback<T, E>>,
}

impl<S: Clone, T, E> Clone for FallbackService<S, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            fallback: Arc::clone(&self.fallback),
        }
    }
}

impl<S, Request, T, E> Service<Request> for FallbackService<S, T, E>
where
    S: Service<Request, Response = T, Error = ResilienceError<E>>,
    S::Future: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    type Response = T;
    type Error = ResilienceError<E>;
    type Future = BoxFuture<'static, Result<T, ResilienceError<E>>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let fallback = Arc::clone(&self.fallback);
        let future = self.inner.call(request);

        Box::pin(async move {
            let result = future.await;
            fallback.apply(result).await
        })
    }
}
