use std::time::Duration;

/// Configuration for the [`RateLimiter`](crate::RateLimiter).
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub(crate) limit_for_period: usize,
    pub(crate) limit_refresh_period: Duration,
    pub(crate) timeout_duration: Duration,
}

impl RateLimiterConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }

    /// Permits handed out per refresh period.
    pub fn limit_for_period(&self) -> usize {
        self.limit_for_period
    }

    /// Length of one period.
    pub fn limit_refresh_period(&self) -> Duration {
        self.limit_refresh_period
    }

    /// Longest a caller waits for a permit.
    pub fn timeout_duration(&self) -> Duration {
        self.timeout_duration
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`RateLimiterConfig`].
pub struct RateLimiterConfigBuilder {
    limit_for_period: usize,
    limit_refresh_period: Duration,
    timeout_duration: Duration,
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - limit_for_period: 50
    /// - limit_refresh_period: 1 second
    /// - timeout_duration: 100ms
    pub fn new() -> Self {
        Self {
            limit_for_period: 50,
            limit_refresh_period: Duration::from_secs(1),
            timeout_duration: Duration::from_millis(100),
        }
    }

    /// Sets the number of permits available in each period.
    ///
    /// Setting this to 100 with a one second refresh period allows 100
    /// calls per second.
    pub fn limit_for_period(mut self, limit: usize) -> Self {
        self.limit_for_period = limit;
        self
    }

    /// Sets the period length.
    ///
    /// Periods are counted from the limiter's creation, not from the first
    /// call. At every boundary the permits reset to `limit_for_period`.
    pub fn limit_refresh_period(mut self, period: Duration) -> Self {
        self.limit_refresh_period = period;
        self
    }

    /// Sets how long a caller may wait for a permit.
    ///
    /// A caller whose permit would become available later than this is
    /// rejected immediately instead of waiting.
    pub fn timeout_duration(mut self, timeout: Duration) -> Self {
        self.timeout_duration = timeout;
        self
    }

    /// Builds the configuration.
    ///
    /// # Panics
    ///
    /// Panics if `limit_for_period` is zero or does not fit in an `i32`, or
    /// if `limit_refresh_period` is shorter than one microsecond.
    pub fn build(self) -> RateLimiterConfig {
        assert!(
            self.limit_for_period > 0,
            "limit_for_period must be greater than 0"
        );
        assert!(
            i32::try_from(self.limit_for_period).is_ok(),
            "limit_for_period must not exceed i32::MAX"
        );
        assert!(
            self.limit_refresh_period >= Duration::from_micros(1),
            "limit_refresh_period must be at least 1 microsecond"
        );
        RateLimiterConfig {
            limit_for_period: self.limit_for_period,
            limit_refresh_period: self.limit_refresh_period,
            timeout_duration: self.timeout_duration,
        }
    }
}
