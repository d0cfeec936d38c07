use fortify_core::ResilienceEvent;
use std::time::{Duration, Instant};

/// Events emitted by a [`TimeLimiter`](crate::TimeLimiter).
#[derive(Debug, Clone)]
pub enum TimeLimiterEvent {
    /// The call finished successfully in time.
    Success {
        pattern_name: String,
        timestamp: Instant,
        duration: Duration,
    },
    /// The call failed in time.
    Error {
        pattern_name: String,
        timestamp: Instant,
        duration: Duration,
    },
    /// The deadline passed first.
    Timeout {
        pattern_name: String,
        timestamp: Instant,
        timeout: Duration,
    },
}

impl ResilienceEvent for TimeLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TimeLimiterEvent::Success { .. } => "success",
            TimeLimiterEvent::Error { .. } => "error",
            TimeLimiterEvent::Timeout { .. } => "timeout",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            TimeLimiterEvent::Success { timestamp, .. }
            | TimeLimiterEvent::Error { timestamp, .. }
            | TimeLimiterEvent::Timeout { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            TimeLimiterEvent::Success { pattern_name, .. }
            | TimeLimiterEvent::Error { pattern_name, .. }
            | TimeLimiterEvent::Timeout { pattern_name, .. } => pattern_name,
        }
    }
}
