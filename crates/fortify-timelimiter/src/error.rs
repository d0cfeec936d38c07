use fortify_core::ResilienceError;
use std::time::Duration;

/// Returned when a call does not finish within its deadline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("TimeLimiter '{name}' recorded a timeout exception after {timeout:?}")]
pub struct TimeoutError {
    /// Name of the time limiter.
    pub name: String,
    /// The deadline that passed.
    pub timeout: Duration,
}

impl<E> From<TimeoutError> for ResilienceError<E> {
    fn from(err: TimeoutError) -> Self {
        ResilienceError::Timeout {
            name: err.name,
            timeout: err.timeout,
        }
    }
}
