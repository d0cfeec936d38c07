use crate::backoff::{ExponentialBackoff, ExponentialRandomBackoff, FixedInterval, IntervalFunction};
use fortify_core::{find_cause, ErrorPredicate};
use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Predicate over a successful result, type-erased so one configuration can
/// serve calls of any result type.
pub type ResultPredicate = Arc<dyn Fn(&dyn Any) -> bool + Send + Sync>;

/// Configuration for [`Retry`](crate::Retry).
#[derive(Clone)]
pub struct RetryConfig {
    pub(crate) max_attempts: usize,
    pub(crate) interval: Arc<dyn IntervalFunction>,
    pub(crate) retry_on_error: Option<ErrorPredicate>,
    pub(crate) ignore_error: Option<ErrorPredicate>,
    pub(crate) retry_on_result: Option<ResultPredicate>,
    pub(crate) retry_on_timeouts: bool,
}

impl RetryConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Total attempts including the first call.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn interval(&self, attempt: usize) -> Duration {
        self.interval.next_interval(attempt)
    }

    /// Whether time-limiter timeouts are retried.
    pub fn retry_on_timeouts(&self) -> bool {
        self.retry_on_timeouts
    }

    pub(crate) fn is_ignored(&self, error: &(dyn Error + 'static)) -> bool {
        self.ignore_error.as_ref().is_some_and(|p| p(error))
    }

    pub(crate) fn is_retryable(&self, error: &(dyn Error + 'static)) -> bool {
        self.retry_on_error.as_ref().map_or(true, |p| p(error))
    }

    pub(crate) fn retries_result(&self, value: &dyn Any) -> bool {
        self.retry_on_result.as_ref().is_some_and(|p| p(value))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("retry_on_error", &self.retry_on_error.is_some())
            .field("ignore_error", &self.ignore_error.is_some())
            .field("retry_on_result", &self.retry_on_result.is_some())
            .field("retry_on_timeouts", &self.retry_on_timeouts)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder {
    max_attempts: usize,
    interval: Arc<dyn IntervalFunction>,
    retry_on_error: Option<ErrorPredicate>,
    ignore_error: Option<ErrorPredicate>,
    retry_on_result: Option<ResultPredicate>,
    retry_on_timeouts: bool,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_attempts: 3
    /// - interval: fixed 500ms
    /// - every application error and every timeout is retried
    /// - no result is retried
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            interval: Arc::new(FixedInterval::new(Duration::from_millis(500))),
            retry_on_error: None,
            ignore_error: None,
            retry_on_result: None,
            retry_on_timeouts: true,
        }
    }

    /// Sets the total number of attempts.
    ///
    /// This includes the initial attempt, so `max_attempts = 3` means one
    /// call plus at most two retries.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Waits the same `duration` before every retry.
    pub fn wait_duration(mut self, duration: Duration) -> Self {
        self.interval = Arc::new(FixedInterval::new(duration));
        self
    }

    /// Doubles the wait after every retry, starting at `initial_interval`.
    pub fn exponential_backoff(mut self, initial_interval: Duration) -> Self {
        self.interval = Arc::new(ExponentialBackoff::new(initial_interval));
        self
    }

    /// Exponential backoff with jitter of `randomization_factor` around every delay.
    pub fn exponential_random_backoff(
        mut self,
        initial_interval: Duration,
        randomization_factor: f64,
    ) -> Self {
        self.interval = Arc::new(ExponentialRandomBackoff::new(
            initial_interval,
            randomization_factor,
        ));
        self
    }

    /// Uses a custom interval function.
    pub fn interval_function<I>(mut self, interval: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        self.interval = Arc::new(interval);
        self
    }

    /// Only retries application errors matching `predicate`.
    ///
    /// Other errors propagate after the first attempt.
    pub fn retry_on_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.retry_on_error = Some(Arc::new(predicate));
        self
    }

    /// Only retries errors of type `X`, found anywhere in the `source()` chain.
    pub fn retry_errors<X>(self) -> Self
    where
        X: Error + 'static,
    {
        self.retry_on_error(|e| find_cause::<X>(e).is_some())
    }

    /// Errors matching `predicate` propagate immediately, without retrying.
    ///
    /// Takes precedence over [`retry_on_error`](Self::retry_on_error).
    pub fn ignore_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.ignore_error = Some(Arc::new(predicate));
        self
    }

    /// Never retries errors of type `X`.
    pub fn ignore_errors<X>(self) -> Self
    where
        X: Error + 'static,
    {
        self.ignore_error(|e| find_cause::<X>(e).is_some())
    }

    /// Retries successful results of type `T` matching `predicate`.
    ///
    /// Results of other types never match. When the last attempt still
    /// matches, its result is returned as is.
    ///
    /// ```
    /// use fortify_retry::RetryConfig;
    ///
    /// // poll until the job reports completion
    /// let config = RetryConfig::builder()
    ///     .retry_on_result(|status: &String| status == "pending")
    ///     .build();
    /// ```
    pub fn retry_on_result<T, F>(mut self, predicate: F) -> Self
    where
        T: 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.retry_on_result = Some(Arc::new(move |value: &dyn Any| {
            value.downcast_ref::<T>().is_some_and(&predicate)
        }));
        self
    }

    /// Sets whether time-limiter timeouts are retried.
    ///
    /// Default: true
    pub fn retry_on_timeouts(mut self, retry: bool) -> Self {
        self.retry_on_timeouts = retry;
        self
    }

    /// Builds the configuration.
    ///
    /// # Panics
    ///
    /// Panics if `max_attempts` is zero.
    pub fn build(self) -> RetryConfig {
        assert!(self.max_attempts > 0, "max_attempts must be greater than 0");
        RetryConfig {
            max_attempts: self.max_attempts,
            interval: self.interval,
            retry_on_error: self.retry_on_error,
            ignore_error: self.ignore_error,
            retry_on_result: self.retry_on_result,
            retry_on_timeouts: self.retry_on_timeouts,
        }
    }
}
