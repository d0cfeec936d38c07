use fortify_core::ResilienceError;

/// Returned when a bulkhead has no permit or worker for a call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Bulkhead '{name}' is full and does not permit further calls")]
pub struct BulkheadFullError {
    /// Name of the rejecting bulkhead.
    pub name: String,
    /// Concurrency limit (worker limit for thread-pool bulkheads).
    pub max_concurrent_calls: usize,
}

impl<E> From<BulkheadFullError> for ResilienceError<E> {
    fn from(err: BulkheadFullError) -> Self {
        ResilienceError::BulkheadFull {
            name: err.name,
            max_concurrent_calls: err.max_concurrent_calls,
        }
    }
}
