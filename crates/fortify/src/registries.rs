//! One registry per primitive kind.

use fortify_bulkhead::{Bulkhead, BulkheadConfig, ThreadPoolBulkhead, ThreadPoolBulkheadConfig};
use fortify_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig};
use fortify_core::Registry;
use fortify_ratelimiter::{RateLimiter, RateLimiterConfig};
use fortify_retry::{Retry, RetryConfig};
use fortify_timelimiter::{TimeLimiter, TimeLimiterConfig};

#[cfg(feature = "tracing")]
use tracing::info;

/// The named instances of an application.
///
/// Each registry hands out the same instance for a name until it is removed
/// or replaced, so every caller of `"inventory"` shares one circuit breaker.
///
/// # Examples
///
/// ```
/// use fortify::{CircuitBreakerConfig, ResilienceRegistries};
/// use std::sync::Arc;
///
/// let registries = ResilienceRegistries::builder()
///     .circuit_breaker_config(
///         CircuitBreakerConfig::builder().sliding_window_size(20).build(),
///     )
///     .build();
///
/// let a = registries.circuit_breakers().get_or_create("inventory");
/// let b = registries.circuit_breakers().get_or_create("inventory");
/// assert!(Arc::ptr_eq(&a, &b));
/// assert_eq!(a.config().sliding_window_size(), 20);
/// ```
#[derive(Debug, Default)]
pub struct ResilienceRegistries {
    circuit_breakers: Registry<CircuitBreaker>,
    bulkheads: Registry<Bulkhead>,
    thread_pool_bulkheads: Registry<ThreadPoolBulkhead>,
    rate_limiters: Registry<RateLimiter>,
    retries: Registry<Retry>,
    time_limiters: Registry<TimeLimiter>,
}

impl ResilienceRegistries {
    /// Registries with every primitive's default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a builder for custom default configurations.
    pub fn builder() -> ResilienceRegistriesBuilder {
        ResilienceRegistriesBuilder::default()
    }

    /// Circuit breakers by name.
    pub fn circuit_breakers(&self) -> &Registry<CircuitBreaker> {
        &self.circuit_breakers
    }

    /// Semaphore bulkheads by name.
    pub fn bulkheads(&self) -> &Registry<Bulkhead> {
        &self.bulkheads
    }

    /// Thread-pool bulkheads by name.
    pub fn thread_pool_bulkheads(&self) -> &Registry<ThreadPoolBulkhead> {
        &self.thread_pool_bulkheads
    }

    /// Rate limiters by name.
    pub fn rate_limiters(&self) -> &Registry<RateLimiter> {
        &self.rate_limiters
    }

    /// Retries by name.
    pub fn retries(&self) -> &Registry<Retry> {
        &self.retries
    }

    /// Time limiters by name.
    pub fn time_limiters(&self) -> &Registry<TimeLimiter> {
        &self.time_limiters
    }

    /// Clears every registry.
    ///
    /// Thread pools stop accepting work; their queued tasks still run.
    /// Subscribers see a `Removed` event for each instance.
    pub fn shutdown(&self) {
        #[cfg(feature = "tracing")]
        info!("shutting down resilience registries");

        self.thread_pool_bulkheads.clear();
        self.bulkheads.clear();
        self.rate_limiters.clear();
        self.time_limiters.clear();
        self.circuit_breakers.clear();
        self.retries.clear();
    }
}

/// Builder for [`ResilienceRegistries`].
#[derive(Default)]
pub struct ResilienceRegistriesBuilder {
    circuit_breaker: CircuitBreakerConfig,
    bulkhead: BulkheadConfig,
    thread_pool_bulkhead: ThreadPoolBulkheadConfig,
    rate_limiter: RateLimiterConfig,
    retry: RetryConfig,
    time_limiter: TimeLimiterConfig,
}

impl ResilienceRegistriesBuilder {
    /// Default circuit breaker configuration.
    pub fn circuit_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Default semaphore bulkhead configuration.
    pub fn bulkhead_config(mut self, config: BulkheadConfig) -> Self {
        self.bulkhead = config;
        self
    }

    /// Default thread-pool bulkhead configuration.
    pub fn thread_pool_bulkhead_config(mut self, config: ThreadPoolBulkheadConfig) -> Self {
        self.thread_pool_bulkhead = config;
        self
    }

    /// Default rate limiter configuration.
    pub fn rate_limiter_config(mut self, config: RateLimiterConfig) -> Self {
        self.rate_limiter = config;
        self
    }

    /// Default retry configuration.
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Default time limiter configuration.
    pub fn time_limiter_config(mut self, config: TimeLimiterConfig) -> Self {
        self.time_limiter = config;
        self
    }

    /// Builds the registries.
    pub fn build(self) -> ResilienceRegistries {
        ResilienceRegistries {
            circuit_breakers: Registry::new(self.circuit_breaker),
            bulkheads: Registry::new(self.bulkhead),
            thread_pool_bulkheads: Registry::new(self.thread_pool_bulkhead),
            rate_limiters: Registry::new(self.rate_limiter),
            retries: Registry::new(self.retry),
            time_limiters: Registry::new(self.time_limiter),
        }
    }
}
