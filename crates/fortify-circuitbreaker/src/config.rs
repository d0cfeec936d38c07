use fortify_core::{find_cause, ErrorPredicate};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the circuit breaker pattern.
///
/// Rates are fractions: `0.5` means 50 %.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    pub(crate) failure_rate_threshold: f64,
    pub(crate) slow_call_rate_threshold: f64,
    pub(crate) slow_call_duration_threshold: Duration,
    pub(crate) sliding_window_size: usize,
    pub(crate) minimum_number_of_calls: usize,
    pub(crate) wait_duration_in_open: Duration,
    pub(crate) permitted_calls_in_half_open: usize,
    pub(crate) record_error: Option<ErrorPredicate>,
    pub(crate) ignore_error: Option<ErrorPredicate>,
}

impl CircuitBreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Failure rate at or above which the circuit opens.
    pub fn failure_rate_threshold(&self) -> f64 {
        self.failure_rate_threshold
    }

    /// Slow call rate at or above which the circuit opens.
    pub fn slow_call_rate_threshold(&self) -> f64 {
        self.slow_call_rate_threshold
    }

    /// Calls taking at least this long count as slow.
    pub fn slow_call_duration_threshold(&self) -> Duration {
        self.slow_call_duration_threshold
    }

    /// Number of outcomes the sliding window keeps.
    pub fn sliding_window_size(&self) -> usize {
        self.sliding_window_size
    }

    /// Outcomes needed before rates are evaluated, never more than the window size.
    pub fn minimum_number_of_calls(&self) -> usize {
        self.minimum_number_of_calls
    }

    /// How long the circuit stays open before allowing trial calls.
    pub fn wait_duration_in_open(&self) -> Duration {
        self.wait_duration_in_open
    }

    /// Trial calls admitted in the half-open state.
    pub fn permitted_calls_in_half_open(&self) -> usize {
        self.permitted_calls_in_half_open
    }

    /// Returns `true` if the error must not be recorded at all.
    pub(crate) fn is_ignored(&self, error: &(dyn Error + 'static)) -> bool {
        self.ignore_error.as_ref().is_some_and(|p| p(error))
    }

    /// Returns `true` if the error counts as a failure.
    pub(crate) fn is_recorded(&self, error: &(dyn Error + 'static)) -> bool {
        self.record_error.as_ref().map_or(true, |p| p(error))
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_rate_threshold", &self.failure_rate_threshold)
            .field("slow_call_rate_threshold", &self.slow_call_rate_threshold)
            .field(
                "slow_call_duration_threshold",
                &self.slow_call_duration_threshold,
            )
            .field("sliding_window_size", &self.sliding_window_size)
            .field("minimum_number_of_calls", &self.minimum_number_of_calls)
            .field("wait_duration_in_open", &self.wait_duration_in_open)
            .field(
                "permitted_calls_in_half_open",
                &self.permitted_calls_in_half_open,
            )
            .finish_non_exhaustive()
    }
}

/// Builder for [`CircuitBreakerConfig`].
pub struct CircuitBreakerConfigBuilder {
    failure_rate_threshold: f64,
    slow_call_rate_threshold: f64,
    slow_call_duration_threshold: Duration,
    sliding_window_size: usize,
    minimum_number_of_calls: Option<usize>,
    wait_duration_in_open: Duration,
    permitted_calls_in_half_open: usize,
    record_error: Option<ErrorPredicate>,
    ignore_error: Option<ErrorPredicate>,
}

impl CircuitBreakerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            slow_call_rate_threshold: 1.0,
            slow_call_duration_threshold: Duration::from_secs(60),
            sliding_window_size: 100,
            minimum_number_of_calls: None,
            wait_duration_in_open: Duration::from_secs(30),
            permitted_calls_in_half_open: 10,
            record_error: None,
            ignore_error: None,
        }
    }

    /// Sets the failure rate threshold at which the circuit will open.
    ///
    /// Default: 0.5 (50%)
    pub fn failure_rate_threshold(mut self, rate: f64) -> Self {
        self.failure_rate_threshold = rate;
        self
    }

    /// Sets the slow call rate threshold at which the circuit will open.
    ///
    /// Default: 1.0 (100%)
    pub fn slow_call_rate_threshold(mut self, rate: f64) -> Self {
        self.slow_call_rate_threshold = rate;
        self
    }

    /// Sets the duration at or above which a call is considered slow.
    ///
    /// Default: 60 seconds
    pub fn slow_call_duration_threshold(mut self, duration: Duration) -> Self {
        self.slow_call_duration_threshold = duration;
        self
    }

    /// Sets how many outcomes the sliding window keeps.
    ///
    /// Default: 100
    pub fn sliding_window_size(mut self, size: usize) -> Self {
        self.sliding_window_size = size;
        self
    }

    /// Sets the number of outcomes required before rates are evaluated.
    ///
    /// Values larger than the window size are clamped to it.
    ///
    /// Default: 100
    pub fn minimum_number_of_calls(mut self, n: usize) -> Self {
        self.minimum_number_of_calls = Some(n);
        self
    }

    /// Sets the duration the circuit remains open before transitioning to half-open.
    ///
    /// Default: 30 seconds
    pub fn wait_duration_in_open(mut self, duration: Duration) -> Self {
        self.wait_duration_in_open = duration;
        self
    }

    /// Sets the number of trial calls admitted in the half-open state.
    ///
    /// Default: 10
    pub fn permitted_calls_in_half_open(mut self, n: usize) -> Self {
        self.permitted_calls_in_half_open = n;
        self
    }

    /// Only errors matching `predicate` count as failures; others count as successes.
    ///
    /// Default: every error is a failure
    pub fn record_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.record_error = Some(Arc::new(predicate));
        self
    }

    /// Errors matching `predicate` are neither failures nor successes.
    ///
    /// Ignored outcomes are left out of the sliding window entirely and give
    /// their half-open trial permit back.
    pub fn ignore_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.ignore_error = Some(Arc::new(predicate));
        self
    }

    /// Ignores every error of type `X`, found anywhere in the `source()` chain.
    ///
    /// ```
    /// use fortify_circuitbreaker::CircuitBreakerConfig;
    ///
    /// #[derive(Debug)]
    /// struct BusinessException;
    /// # impl std::fmt::Display for BusinessException {
    /// #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "business") }
    /// # }
    /// impl std::error::Error for BusinessException {}
    ///
    /// let config = CircuitBreakerConfig::builder()
    ///     .ignore_errors::<BusinessException>()
    ///     .build();
    /// ```
    pub fn ignore_errors<X>(self) -> Self
    where
        X: Error + 'static,
    {
        self.ignore_error(|e| find_cause::<X>(e).is_some())
    }

    /// Only records errors of type `X` as failures.
    pub fn record_errors<X>(self) -> Self
    where
        X: Error + 'static,
    {
        self.record_error(|e| find_cause::<X>(e).is_some())
    }

    /// Builds the configuration.
    ///
    /// # Panics
    ///
    /// Panics if a rate threshold is not greater than 0.0 and at most 1.0,
    /// or if the window size or the half-open trial count is zero.
    pub fn build(self) -> CircuitBreakerConfig {
        assert!(
            self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 1.0,
            "failure_rate_threshold must be greater than 0.0 and at most 1.0"
        );
        assert!(
            self.slow_call_rate_threshold > 0.0 && self.slow_call_rate_threshold <= 1.0,
            "slow_call_rate_threshold must be greater than 0.0 and at most 1.0"
        );
        assert!(
            self.sliding_window_size > 0,
            "sliding_window_size must be greater than 0"
        );
        assert!(
            self.permitted_calls_in_half_open > 0,
            "permitted_calls_in_half_open must be greater than 0"
        );

        let minimum_number_of_calls = self
            .minimum_number_of_calls
            .unwrap_or(100)
            .clamp(1, self.sliding_window_size);

        CircuitBreakerConfig {
            failure_rate_threshold: self.failure_rate_threshold,
            slow_call_rate_threshold: self.slow_call_rate_threshold,
            slow_call_duration_threshold: self.slow_call_duration_threshold,
            sliding_window_size: self.sliding_window_size,
            minimum_number_of_calls,
            wait_duration_in_open: self.wait_duration_in_open,
            permitted_calls_in_half_open: self.permitted_calls_in_half_open,
            record_error: self.record_error,
            ignore_error: self.ignore_error,
        }
    }
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
