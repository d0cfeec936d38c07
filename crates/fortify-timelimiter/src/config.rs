//! Configuration for the time limiter.

use std::time::Duration;

/// Configuration for [`TimeLimiter`](crate::TimeLimiter).
#[derive(Debug, Clone)]
pub struct TimeLimiterConfig {
    pub(crate) timeout_duration: Duration,
    pub(crate) cancel_running_future: bool,
}

impl TimeLimiterConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> TimeLimiterConfigBuilder {
        TimeLimiterConfigBuilder::new()
    }

    /// Deadline for each call.
    pub fn timeout_duration(&self) -> Duration {
        self.timeout_duration
    }

    /// Whether expired work is cancelled.
    pub fn cancel_running_future(&self) -> bool {
        self.cancel_running_future
    }
}

impl Default for TimeLimiterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`TimeLimiterConfig`].
pub struct TimeLimiterConfigBuilder {
    timeout_duration: Duration,
    cancel_running_future: bool,
}

impl TimeLimiterConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            timeout_duration: Duration::from_secs(1),
            cancel_running_future: true,
        }
    }

    /// Sets the timeout duration.
    ///
    /// Default: 1 second
    pub fn timeout_duration(mut self, duration: Duration) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Sets whether expired work is cancelled.
    ///
    /// When true, an expired future is dropped and queued thread-pool work
    /// is withdrawn. When false, the work keeps running in the background and
    /// its result is discarded. Work already running on a thread is never
    /// interrupted either way.
    ///
    /// Default: true
    pub fn cancel_running_future(mut self, cancel: bool) -> Self {
        self.cancel_running_future = cancel;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> TimeLimiterConfig {
        TimeLimiterConfig {
            timeout_duration: self.timeout_duration,
            cancel_running_future: self.cancel_running_future,
        }
    }
}

impl Default for TimeLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
