use fortify_core::ResilienceError;

/// Returned when a rate limiter has no permit within the caller's timeout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("RateLimiter '{name}' does not permit further calls")]
pub struct RequestNotPermitted {
    /// Name of the rejecting limiter.
    pub name: String,
}

impl<E> From<RequestNotPermitted> for ResilienceError<E> {
    fn from(err: RequestNotPermitted) -> Self {
        ResilienceError::RequestNotPermitted { name: err.name }
    }
}
