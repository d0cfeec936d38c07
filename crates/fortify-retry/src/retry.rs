//! The retry loop.
//!
//! [`RetryContext`] classifies the outcome of each attempt and decides
//! between returning and retrying; the synchronous and asynchronous loops
//! only differ in how they wait.

use crate::config::RetryConfig;
use crate::events::RetryEvent;
use fortify_core::{EventPublisher, Registrable, ResilienceError};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Call counters, partitioned by outcome and whether a retry happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryMetrics {
    /// Succeeded on the first attempt.
    pub successful_calls_without_retry: u64,
    /// Succeeded after at least one retry.
    pub successful_calls_with_retry: u64,
    /// Failed on the first attempt without being retried.
    pub failed_calls_without_retry: u64,
    /// Failed after at least one retry.
    pub failed_calls_with_retry: u64,
}

/// Re-runs failed calls according to a [`RetryConfig`].
pub struct Retry {
    name: String,
    config: RetryConfig,
    successful_without_retry: AtomicU64,
    successful_with_retry: AtomicU64,
    failed_without_retry: AtomicU64,
    failed_with_retry: AtomicU64,
    events: EventPublisher<RetryEvent>,
}

enum Decision<T, E> {
    Retry(Duration),
    Done(Result<T, ResilienceError<E>>),
}

enum Class {
    Retryable,
    Ignored,
    Propagate,
}

/// Per-call attempt state.
struct RetryContext<'a> {
    retry: &'a Retry,
    attempts: usize,
}

impl RetryContext<'_> {
    fn on_outcome<T, E>(&mut self, outcome: Result<T, ResilienceError<E>>) -> Decision<T, E>
    where
        T: 'static,
        E: Error + 'static,
    {
        self.attempts += 1;
        let config = &self.retry.config;
        let exhausted = self.attempts >= config.max_attempts;

        match outcome {
            Ok(value) => {
                if !exhausted && config.retries_result(&value) {
                    return self.retry_after();
                }
                self.retry.succeeded(self.attempts);
                Decision::Done(Ok(value))
            }
            Err(err) => match self.classify(&err) {
                Class::Retryable if !exhausted => self.retry_after(),
                Class::Retryable => {
                    self.retry.failed(self.attempts);
                    Decision::Done(Err(ResilienceError::RetryExhausted {
                        name: self.retry.name.clone(),
                        attempts: self.attempts,
                        last: Box::new(err),
                    }))
                }
                Class::Ignored => {
                    self.retry.ignored(self.attempts);
                    Decision::Done(Err(err))
                }
                Class::Propagate => {
                    self.retry.failed(self.attempts);
                    Decision::Done(Err(err))
                }
            },
        }
    }

    fn classify<E>(&self, err: &ResilienceError<E>) -> Class
    where
        E: Error + 'static,
    {
        let config = &self.retry.config;
        match err {
            ResilienceError::Application(e) if config.is_ignored(e) => Class::Ignored,
            ResilienceError::Application(e) if config.is_retryable(e) => Class::Retryable,
            ResilienceError::Timeout { .. } if config.retry_on_timeouts => Class::Retryable,
            // admission rejections and nested exhaustion are never retried here
            _ => Class::Propagate,
        }
    }

    fn retry_after<T, E>(&self) -> Decision<T, E> {
        let delay = self.retry.config.interval(self.attempts - 1);

        #[cfg(feature = "tracing")]
        debug!(
            retry = %self.retry.name,
            attempt = self.attempts,
            delay_ms = delay.as_millis() as u64,
            "retrying after failed attempt"
        );

        #[cfg(feature = "metrics")]
        counter!("retry_attempts_total", "retry" => self.retry.name.clone()).increment(1);

        self.retry.events.emit(&RetryEvent::Retry {
            pattern_name: self.retry.name.clone(),
            timestamp: Instant::now(),
            attempt: self.attempts,
            delay,
        });
        Decision::Retry(delay)
    }
}

impl Retry {
    /// Creates a retry with zeroed counters.
    pub fn new(name: impl Into<String>, config: RetryConfig) -> Self {
        #[cfg(feature = "metrics")]
        describe_metrics();

        Self {
            name: name.into(),
            config,
            successful_without_retry: AtomicU64::new(0),
            successful_with_retry: AtomicU64::new(0),
            failed_without_retry: AtomicU64::new(0),
            failed_with_retry: AtomicU64::new(0),
            events: EventPublisher::new(),
        }
    }

    /// Creates a retry with the default configuration.
    pub fn of_defaults(name: impl Into<String>) -> Self {
        Self::new(name, RetryConfig::default())
    }

    /// The retry's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The retry's configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// The publisher listeners can subscribe to.
    pub fn event_publisher(&self) -> &EventPublisher<RetryEvent> {
        &self.events
    }

    /// Subscribes to every event.
    pub fn on_event<F>(&self, f: F)
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        self.events.subscribe_fn(f);
    }

    /// Subscribes to retries; called with the 1-indexed retry and its delay.
    pub fn on_retry<F>(&self, f: F)
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.events.subscribe_fn(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        });
    }

    /// Current call counters.
    pub fn metrics(&self) -> RetryMetrics {
        RetryMetrics {
            successful_calls_without_retry: self.successful_without_retry.load(Ordering::Relaxed),
            successful_calls_with_retry: self.successful_with_retry.load(Ordering::Relaxed),
            failed_calls_without_retry: self.failed_without_retry.load(Ordering::Relaxed),
            failed_calls_with_retry: self.failed_with_retry.load(Ordering::Relaxed),
        }
    }

    fn context(&self) -> RetryContext<'_> {
        RetryContext {
            retry: self,
            attempts: 0,
        }
    }

    fn succeeded(&self, attempts: usize) {
        let (counter, _outcome) = if attempts > 1 {
            (&self.successful_with_retry, "successful_with_retry")
        } else {
            (&self.successful_without_retry, "successful_without_retry")
        };
        counter.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        counter!("retry_calls_total", "retry" => self.name.clone(), "outcome" => _outcome)
            .increment(1);

        self.events.emit(&RetryEvent::Success {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
            attempts,
        });
    }

    fn count_failure(&self, attempts: usize) {
        let (counter, _outcome) = if attempts > 1 {
            (&self.failed_with_retry, "failed_with_retry")
        } else {
            (&self.failed_without_retry, "failed_without_retry")
        };
        counter.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        counter!("retry_calls_total", "retry" => self.name.clone(), "outcome" => _outcome)
            .increment(1);
    }

    fn failed(&self, attempts: usize) {
        self.count_failure(attempts);

        #[cfg(feature = "tracing")]
        if attempts > 1 {
            warn!(retry = %self.name, attempts, "call failed after retrying");
        }

        self.events.emit(&RetryEvent::Error {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
            attempts,
        });
    }

    fn ignored(&self, attempts: usize) {
        self.count_failure(attempts);
        self.events.emit(&RetryEvent::IgnoredError {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
        });
    }

    /// Runs a synchronous operation, sleeping the thread between attempts.
    pub fn execute_sync<T, E, F>(&self, mut f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Result<T, E>,
        T: 'static,
        E: Error + 'static,
    {
        self.call_sync(|| f().map_err(ResilienceError::Application))
    }

    /// Retries an already-decorated synchronous operation.
    pub fn call_sync<T, E, F>(&self, mut f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Result<T, ResilienceError<E>>,
        T: 'static,
        E: Error + 'static,
    {
        let mut context = self.context();
        loop {
            match context.on_outcome(f()) {
                Decision::Done(result) => return result,
                Decision::Retry(delay) => {
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
    }

    /// Runs the future produced by `f`, waiting on the tokio timer between attempts.
    pub async fn execute<T, E, F, Fut>(&self, mut f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: 'static,
        E: Error + 'static,
    {
        self.call(|| {
            let attempt = f();
            async move { attempt.await.map_err(ResilienceError::Application) }
        })
        .await
    }

    /// Retries an already-decorated asynchronous operation.
    pub async fn call<T, E, F, Fut>(&self, mut f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
        T: 'static,
        E: Error + 'static,
    {
        let mut context = self.context();
        loop {
            match context.on_outcome(f().await) {
                Decision::Done(result) => return result,
                Decision::Retry(delay) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Retry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("metrics", &self.metrics())
            .finish()
    }
}

impl Registrable for Retry {
    type Config = RetryConfig;
    const KIND: &'static str = "retry";

    fn create(name: &str, config: &RetryConfig) -> Self {
        Retry::new(name, config.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(feature = "metrics")]
fn describe_metrics() {
    METRICS_INIT.call_once(|| {
        describe_counter!(
            "retry_calls_total",
            "Total number of calls, labelled by outcome and whether they were retried"
        );
        describe_counter!(
            "retry_attempts_total",
            "Total number of retry attempts made"
        );
    });
}
