//! Configuration for both bulkhead flavours.

use std::time::Duration;

/// Configuration for the semaphore [`Bulkhead`](crate::Bulkhead).
#[derive(Debug, Clone)]
pub struct BulkheadConfig {
    pub(crate) max_concurrent_calls: usize,
    pub(crate) max_wait_duration: Duration,
}

impl BulkheadConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> BulkheadConfigBuilder {
        BulkheadConfigBuilder::new()
    }

    /// Maximum number of calls running at once.
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_concurrent_calls
    }

    /// How long a caller waits for a permit before being rejected.
    pub fn max_wait_duration(&self) -> Duration {
        self.max_wait_duration
    }
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`BulkheadConfig`].
pub struct BulkheadConfigBuilder {
    max_concurrent_calls: usize,
    max_wait_duration: Duration,
}

impl BulkheadConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            max_concurrent_calls: 25,
            max_wait_duration: Duration::ZERO,
        }
    }

    /// Sets the maximum number of concurrent calls.
    ///
    /// Default: 25
    pub fn max_concurrent_calls(mut self, max: usize) -> Self {
        self.max_concurrent_calls = max;
        self
    }

    /// Sets how long callers wait for a permit.
    ///
    /// Zero rejects immediately when no permit is free.
    ///
    /// Default: 0
    pub fn max_wait_duration(mut self, duration: Duration) -> Self {
        self.max_wait_duration = duration;
        self
    }

    /// Builds the configuration.
    ///
    /// # Panics
    ///
    /// Panics if `max_concurrent_calls` is zero.
    pub fn build(self) -> BulkheadConfig {
        assert!(
            self.max_concurrent_calls > 0,
            "max_concurrent_calls must be greater than 0"
        );
        BulkheadConfig {
            max_concurrent_calls: self.max_concurrent_calls,
            max_wait_duration: self.max_wait_duration,
        }
    }
}

impl Default for BulkheadConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the [`ThreadPoolBulkhead`](crate::ThreadPoolBulkhead).
#[derive(Debug, Clone)]
pub struct ThreadPoolBulkheadConfig {
    pub(crate) core_thread_pool_size: usize,
    pub(crate) max_thread_pool_size: usize,
    pub(crate) queue_capacity: usize,
    pub(crate) keep_alive_duration: Duration,
}

impl ThreadPoolBulkheadConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ThreadPoolBulkheadConfigBuilder {
        ThreadPoolBulkheadConfigBuilder::new()
    }

    /// Workers kept alive while idle.
    pub fn core_thread_pool_size(&self) -> usize {
        self.core_thread_pool_size
    }

    /// Upper bound on workers.
    pub fn max_thread_pool_size(&self) -> usize {
        self.max_thread_pool_size
    }

    /// Tasks that may wait for a worker.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Idle time after which workers above the core size exit.
    pub fn keep_alive_duration(&self) -> Duration {
        self.keep_alive_duration
    }
}

impl Default for ThreadPoolBulkheadConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ThreadPoolBulkheadConfig`].
pub struct ThreadPoolBulkheadConfigBuilder {
    core_thread_pool_size: Option<usize>,
    max_thread_pool_size: Option<usize>,
    queue_capacity: usize,
    keep_alive_duration: Duration,
}

impl ThreadPoolBulkheadConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            core_thread_pool_size: None,
            max_thread_pool_size: None,
            queue_capacity: 100,
            keep_alive_duration: Duration::from_millis(20),
        }
    }

    /// Sets the number of workers kept alive while idle.
    ///
    /// Default: available parallelism minus one, at least 1
    pub fn core_thread_pool_size(mut self, size: usize) -> Self {
        self.core_thread_pool_size = Some(size);
        self
    }

    /// Sets the maximum number of workers.
    ///
    /// Default: available parallelism
    pub fn max_thread_pool_size(mut self, size: usize) -> Self {
        self.max_thread_pool_size = Some(size);
        self
    }

    /// Sets how many tasks may wait for a worker.
    ///
    /// Zero hands tasks directly to idle workers only.
    ///
    /// Default: 100
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the idle time after which workers above the core size exit.
    ///
    /// Default: 20 milliseconds
    pub fn keep_alive_duration(mut self, duration: Duration) -> Self {
        self.keep_alive_duration = duration;
        self
    }

    /// Builds the configuration.
    ///
    /// # Panics
    ///
    /// Panics if the core size is zero or larger than the maximum size.
    pub fn build(self) -> ThreadPoolBulkheadConfig {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let max_thread_pool_size = self
            .max_thread_pool_size
            .unwrap_or_else(|| parallelism.max(self.core_thread_pool_size.unwrap_or(1)));
        let core_thread_pool_size = self
            .core_thread_pool_size
            .unwrap_or_else(|| max_thread_pool_size.saturating_sub(1).max(1));

        assert!(
            core_thread_pool_size > 0,
            "core_thread_pool_size must be greater than 0"
        );
        assert!(
            core_thread_pool_size <= max_thread_pool_size,
            "core_thread_pool_size must not exceed max_thread_pool_size"
        );

        ThreadPoolBulkheadConfig {
            core_thread_pool_size,
            max_thread_pool_size,
            queue_capacity: self.queue_capacity,
            keep_alive_duration: self.keep_alive_duration,
        }
    }
}

impl Default for ThreadPoolBulkheadConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
