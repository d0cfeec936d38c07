//! Tower layer that lifts a plain service into [`ResilienceError`].
//!
//! The tower layers of the primitive crates expect their inner service to
//! fail with `ResilienceError<E>`. Put [`ResilienceErrorLayer`] innermost to
//! adapt a service that fails with a bare `E`:
//!
//! ```
//! use fortify_core::{ResilienceError, ResilienceErrorLayer};
//! use tower::{service_fn, Layer, ServiceExt};
//!
//! # #[derive(Debug)] struct Down;
//! # impl std::fmt::Display for Down {
//! #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "down") }
//! # }
//! # impl std::error::Error for Down {}
//! # async fn example() {
//! let svc = ResilienceErrorLayer.layer(service_fn(|_: ()| async { Err::<(), _>(Down) }));
//! let err: ResilienceError<Down> = svc.oneshot(()).await.unwrap_err();
//! assert!(err.is_application());
//! # }
//! ```

use crate::ResilienceError;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Wraps the inner service's error in [`ResilienceError::Application`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResilienceErrorLayer;

impl<S> Layer<S> for ResilienceErrorLayer {
    type Service = ResilienceErrorService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ResilienceErrorService { inner }
    }
}

/// Service produced by [`ResilienceErrorLayer`].
#[derive(Debug, Clone)]
pub struct ResilienceErrorService<S> {
    inner: S,
}

impl<S, Request> Service<Request> for ResilienceErrorService<S>
where
    S: Service<Request>,
{
    type Response = S::Response;
    type Error = ResilienceError<S::Error>;
    type Future = ResilienceErrorFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(ResilienceError::Application)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        ResilienceErrorFuture {
            inner: self.inner.call(request),
        }
    }
}

pin_project! {
    /// Response future of [`ResilienceErrorService`].
    pub struct ResilienceErrorFuture<F> {
        #[pin]
        inner: F,
    }
}

impl<F, T, E> Future for ResilienceErrorFuture<F>
where
    F: Future<Output = Result<T, E>>,
{
    type Output = Result<T, ResilienceError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project()
            .inner
            .poll(cx)
            .map_err(ResilienceError::Application)
    }
}
