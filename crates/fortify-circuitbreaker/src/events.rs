use crate::circuit::CircuitState;
use fortify_core::ResilienceEvent;
use std::time::{Duration, Instant};

/// Events emitted by a circuit breaker.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The breaker moved between states.
    StateTransition {
        pattern_name: String,
        timestamp: Instant,
        from_state: CircuitState,
        to_state: CircuitState,
    },
    /// A call was rejected without running.
    CallNotPermitted {
        pattern_name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A successful outcome was recorded.
    SuccessRecorded {
        pattern_name: String,
        timestamp: Instant,
        duration: Duration,
        state: CircuitState,
    },
    /// A failed outcome was recorded.
    ErrorRecorded {
        pattern_name: String,
        timestamp: Instant,
        duration: Duration,
        state: CircuitState,
    },
    /// An error matched the ignore predicate and was not recorded.
    IgnoredError {
        pattern_name: String,
        timestamp: Instant,
        duration: Duration,
    },
    /// A recorded call reached the slow call duration threshold.
    SlowCallDetected {
        pattern_name: String,
        timestamp: Instant,
        duration: Duration,
        state: CircuitState,
    },
    /// The failure rate reached its threshold.
    FailureRateExceeded {
        pattern_name: String,
        timestamp: Instant,
        failure_rate: f64,
    },
    /// The slow call rate reached its threshold.
    SlowCallRateExceeded {
        pattern_name: String,
        timestamp: Instant,
        slow_call_rate: f64,
    },
    /// The breaker was reset to a closed, empty state.
    Reset {
        pattern_name: String,
        timestamp: Instant,
    },
}

impl ResilienceEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::CallNotPermitted { .. } => "call_not_permitted",
            CircuitBreakerEvent::SuccessRecorded { .. } => "success_recorded",
            CircuitBreakerEvent::ErrorRecorded { .. } => "error_recorded",
            CircuitBreakerEvent::IgnoredError { .. } => "ignored_error",
            CircuitBreakerEvent::SlowCallDetected { .. } => "slow_call_detected",
            CircuitBreakerEvent::FailureRateExceeded { .. } => "failure_rate_exceeded",
            CircuitBreakerEvent::SlowCallRateExceeded { .. } => "slow_call_rate_exceeded",
            CircuitBreakerEvent::Reset { .. } => "reset",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::CallNotPermitted { timestamp, .. }
            | CircuitBreakerEvent::SuccessRecorded { timestamp, .. }
            | CircuitBreakerEvent::ErrorRecorded { timestamp, .. }
            | CircuitBreakerEvent::IgnoredError { timestamp, .. }
            | CircuitBreakerEvent::SlowCallDetected { timestamp, .. }
            | CircuitBreakerEvent::FailureRateExceeded { timestamp, .. }
            | CircuitBreakerEvent::SlowCallRateExceeded { timestamp, .. }
            | CircuitBreakerEvent::Reset { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            CircuitBreakerEvent::StateTransition { pattern_name, .. }
            | CircuitBreakerEvent::CallNotPermitted { pattern_name, .. }
            | CircuitBreakerEvent::SuccessRecorded { pattern_name, .. }
            | CircuitBreakerEvent::ErrorRecorded { pattern_name, .. }
            | CircuitBreakerEvent::IgnoredError { pattern_name, .. }
            | CircuitBreakerEvent::SlowCallDetected { pattern_name, .. }
            | CircuitBreakerEvent::FailureRateExceeded { pattern_name, .. }
            | CircuitBreakerEvent::SlowCallRateExceeded { pattern_name, .. }
            | CircuitBreakerEvent::Reset { pattern_name, .. } => pattern_name,
        }
    }
}
