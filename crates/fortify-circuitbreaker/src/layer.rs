//! Tower integration for the circuit breaker.

use crate::circuit::CircuitBreaker;
use crate::config::CircuitBreakerConfig;
use fortify_core::ResilienceError;
use futures::future::BoxFuture;
use std::error::Error;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Guards a tower service with a shared [`CircuitBreaker`].
///
/// The inner service must fail with [`ResilienceError`]; wrap plain services
/// with `fortify_core::ResilienceErrorLayer` first.
#[derive(Clone)]
pub struct CircuitBreakerLayer {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerLayer {
    /// Uses an existing breaker, e.g. one obtained from a registry.
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }

    /// Creates a fresh breaker from `config`.
    pub fn from_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::new(Arc::new(CircuitBreaker::new(name, config)))
    }

    /// The breaker shared by every service this layer produces.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreakerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreakerService {
            inner,
            breaker: Arc::clone(&self.breaker),
        }
    }
}

/// Service produced by [`CircuitBreakerLayer`].
#[derive(Clone)]
pub struct CircuitBreakerService<S> {
    inner: S,
    breaker: Arc<CircuitBreaker>,
}

impl<S> CircuitBreakerService<S> {
    /// The breaker guarding this service.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

impl<S, Request, E> Service<Request> for CircuitBreakerService<S>
where
    S: Service<Request, Error = ResilienceError<E>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    E: Error + Send + 'static,
    Request: Send + 'static,
{
    type Response = S::Response;
    type Error = ResilienceError<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let breaker = Arc::clone(&self.breaker);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let permit = breaker.acquire_call_permit()?;
            let result = inner.call(request).await;
            permit.settle(&result);
            result
        })
    }
}
