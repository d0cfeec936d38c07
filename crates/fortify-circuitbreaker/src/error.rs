use crate::circuit::CircuitState;
use fortify_core::ResilienceError;

/// Returned when the circuit breaker rejects a call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("CircuitBreaker '{name}' is {state} and does not permit further calls")]
pub struct CallNotPermitted {
    /// Name of the rejecting breaker.
    pub name: String,
    /// State at the time of rejection.
    pub state: CircuitState,
}

impl<E> From<CallNotPermitted> for ResilienceError<E> {
    fn from(err: CallNotPermitted) -> Self {
        ResilienceError::CallNotPermitted {
            name: err.name,
            state: err.state.as_str(),
        }
    }
}
