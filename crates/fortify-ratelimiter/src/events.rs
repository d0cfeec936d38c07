use fortify_core::ResilienceEvent;
use std::time::{Duration, Instant};

/// Events emitted by a [`RateLimiter`](crate::RateLimiter).
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// A permit was granted, possibly after waiting for a later period.
    SuccessfulAcquire {
        pattern_name: String,
        timestamp: Instant,
        wait_duration: Duration,
    },
    /// No permit could be granted within the timeout.
    FailedAcquire {
        pattern_name: String,
        timestamp: Instant,
        timeout: Duration,
    },
    /// The remaining permits of the current period were discarded.
    Drained {
        pattern_name: String,
        timestamp: Instant,
        discarded_permits: usize,
    },
}

impl ResilienceEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::SuccessfulAcquire { .. } => "successful_acquire",
            RateLimiterEvent::FailedAcquire { .. } => "failed_acquire",
            RateLimiterEvent::Drained { .. } => "drained",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::SuccessfulAcquire { timestamp, .. }
            | RateLimiterEvent::FailedAcquire { timestamp, .. }
            | RateLimiterEvent::Drained { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RateLimiterEvent::SuccessfulAcquire { pattern_name, .. }
            | RateLimiterEvent::FailedAcquire { pattern_name, .. }
            | RateLimiterEvent::Drained { pattern_name, .. } => pattern_name,
        }
    }
}
