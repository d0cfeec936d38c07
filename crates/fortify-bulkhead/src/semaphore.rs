//! Semaphore bulkhead.

use crate::config::BulkheadConfig;
use crate::error::BulkheadFullError;
use crate::events::BulkheadEvent;
use fortify_core::{EventPublisher, Registrable, ResilienceError};
use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::Notify;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Point-in-time view of a semaphore bulkhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkheadMetrics {
    /// Permits currently free.
    pub available_concurrent_calls: usize,
    /// Configured limit.
    pub max_allowed_concurrent_calls: usize,
}

/// Caps the number of calls running at once.
///
/// Permits are a CAS-updated counter. Blocking callers park on a condvar,
/// async callers on a tokio [`Notify`]; both wait at most
/// `max_wait_duration`.
pub struct Bulkhead {
    name: String,
    config: BulkheadConfig,
    available: AtomicUsize,
    sync_waiters: AtomicUsize,
    sync_lock: Mutex<()>,
    sync_ready: Condvar,
    async_ready: Notify,
    events: EventPublisher<BulkheadEvent>,
}

/// Releases its permit when dropped, including on panic.
struct Permit<'a> {
    bulkhead: &'a Bulkhead,
    acquired_at: Instant,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.bulkhead.release_permission();
        self.bulkhead.finished(self.acquired_at);
    }
}

impl Bulkhead {
    /// Creates a bulkhead with every permit free.
    pub fn new(name: impl Into<String>, config: BulkheadConfig) -> Self {
        #[cfg(feature = "metrics")]
        describe_metrics();

        Self {
            name: name.into(),
            available: AtomicUsize::new(config.max_concurrent_calls),
            config,
            sync_waiters: AtomicUsize::new(0),
            sync_lock: Mutex::new(()),
            sync_ready: Condvar::new(),
            async_ready: Notify::new(),
            events: EventPublisher::new(),
        }
    }

    /// Creates a bulkhead with the default configuration.
    pub fn of_defaults(name: impl Into<String>) -> Self {
        Self::new(name, BulkheadConfig::default())
    }

    /// The bulkhead's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bulkhead's configuration.
    pub fn config(&self) -> &BulkheadConfig {
        &self.config
    }

    /// The publisher listeners can subscribe to.
    pub fn event_publisher(&self) -> &EventPublisher<BulkheadEvent> {
        &self.events
    }

    /// Subscribes to every event.
    pub fn on_event<F>(&self, f: F)
    where
        F: Fn(&BulkheadEvent) + Send + Sync + 'static,
    {
        self.events.subscribe_fn(f);
    }

    /// Current permit counts.
    pub fn metrics(&self) -> BulkheadMetrics {
        BulkheadMetrics {
            available_concurrent_calls: self.available.load(Ordering::SeqCst),
            max_allowed_concurrent_calls: self.config.max_concurrent_calls,
        }
    }

    fn try_take(&self) -> bool {
        self.available
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |a| a.checked_sub(1))
            .is_ok()
    }

    /// Takes a permit if one is free, without waiting.
    pub fn try_acquire_permission(&self) -> Result<(), BulkheadFullError> {
        if self.try_take() {
            self.permitted();
            Ok(())
        } else {
            Err(self.rejected())
        }
    }

    /// Takes a permit, blocking the calling thread up to `max_wait_duration`.
    pub fn acquire_permission(&self) -> Result<(), BulkheadFullError> {
        if self.try_take() {
            self.permitted();
            return Ok(());
        }
        if self.config.max_wait_duration.is_zero() {
            return Err(self.rejected());
        }

        let deadline = Instant::now() + self.config.max_wait_duration;
        let mut guard = fortify_core::lock(&self.sync_lock);
        self.sync_waiters.fetch_add(1, Ordering::SeqCst);
        let acquired = loop {
            if self.try_take() {
                break true;
            }
            let now = Instant::now();
            if now >= deadline {
                break false;
            }
            guard = self
                .sync_ready
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        };
        self.sync_waiters.fetch_sub(1, Ordering::SeqCst);
        drop(guard);

        if acquired {
            self.permitted();
            Ok(())
        } else {
            Err(self.rejected())
        }
    }

    /// Takes a permit, waiting asynchronously up to `max_wait_duration`.
    pub async fn acquire_permission_async(&self) -> Result<(), BulkheadFullError> {
        if self.try_take() {
            self.permitted();
            return Ok(());
        }
        if self.config.max_wait_duration.is_zero() {
            return Err(self.rejected());
        }

        let deadline = tokio::time::Instant::now() + self.config.max_wait_duration;
        loop {
            let mut notified = pin!(self.async_ready.notified());
            // Register before re-checking so a release in between is not missed.
            notified.as_mut().enable();
            if self.try_take() {
                self.permitted();
                return Ok(());
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                if self.try_take() {
                    self.permitted();
                    return Ok(());
                }
                return Err(self.rejected());
            }
        }
    }

    /// Returns a permit and wakes waiters. Never exceeds the configured limit.
    pub fn release_permission(&self) {
        let max = self.config.max_concurrent_calls;
        let _ = self
            .available
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |a| {
                (a < max).then_some(a + 1)
            });
        if self.sync_waiters.load(Ordering::SeqCst) > 0 {
            let _guard = fortify_core::lock(&self.sync_lock);
            self.sync_ready.notify_all();
        }
        self.async_ready.notify_waiters();

        #[cfg(feature = "metrics")]
        gauge!("bulkhead_concurrent_calls", "bulkhead" => self.name.clone())
            .set(self.concurrent_calls() as f64);
    }

    fn concurrent_calls(&self) -> usize {
        self.config
            .max_concurrent_calls
            .saturating_sub(self.available.load(Ordering::SeqCst))
    }

    fn permitted(&self) {
        let concurrent_calls = self.concurrent_calls();

        #[cfg(feature = "tracing")]
        debug!(bulkhead = %self.name, concurrent_calls, "bulkhead call permitted");

        #[cfg(feature = "metrics")]
        {
            counter!("bulkhead_calls_permitted_total", "bulkhead" => self.name.clone())
                .increment(1);
            gauge!("bulkhead_concurrent_calls", "bulkhead" => self.name.clone())
                .set(concurrent_calls as f64);
        }

        self.events.emit(&BulkheadEvent::CallPermitted {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
            concurrent_calls,
        });
    }

    fn rejected(&self) -> BulkheadFullError {
        #[cfg(feature = "tracing")]
        warn!(bulkhead = %self.name, max = self.config.max_concurrent_calls, "bulkhead full");

        #[cfg(feature = "metrics")]
        counter!("bulkhead_calls_rejected_total", "bulkhead" => self.name.clone()).increment(1);

        self.events.emit(&BulkheadEvent::CallRejected {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
            max_concurrent_calls: self.config.max_concurrent_calls,
        });
        BulkheadFullError {
            name: self.name.clone(),
            max_concurrent_calls: self.config.max_concurrent_calls,
        }
    }

    fn finished(&self, acquired_at: Instant) {
        let duration = acquired_at.elapsed();

        #[cfg(feature = "metrics")]
        histogram!("bulkhead_call_duration_seconds", "bulkhead" => self.name.clone())
            .record(duration.as_secs_f64());

        self.events.emit(&BulkheadEvent::CallFinished {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
            duration,
        });
    }

    fn permit(&self) -> Permit<'_> {
        Permit {
            bulkhead: self,
            acquired_at: Instant::now(),
        }
    }

    /// Runs a synchronous operation while holding a permit.
    pub fn execute_sync<T, E, F>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.call_sync(|| f().map_err(ResilienceError::Application))
    }

    /// Runs an already-decorated synchronous operation while holding a permit.
    pub fn call_sync<T, E, F>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, ResilienceError<E>>,
    {
        self.acquire_permission()?;
        let _permit = self.permit();
        f()
    }

    /// Runs a future while holding a permit.
    pub async fn execute<T, E, Fut>(&self, future: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        self.call(async move { future.await.map_err(ResilienceError::Application) })
            .await
    }

    /// Runs an already-decorated future while holding a permit.
    ///
    /// The permit is also released if the returned future is dropped early.
    pub async fn call<T, E, Fut>(&self, future: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        self.acquire_permission_async().await?;
        let _permit = self.permit();
        future.await
    }
}

impl fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulkhead")
            .field("name", &self.name)
            .field("metrics", &self.metrics())
            .finish()
    }
}

impl Registrable for Bulkhead {
    type Config = BulkheadConfig;
    const KIND: &'static str = "bulkhead";

    fn create(name: &str, config: &BulkheadConfig) -> Self {
        Bulkhead::new(name, config.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(feature = "metrics")]
pub(crate) fn describe_metrics() {
    METRICS_INIT.call_once(|| {
        describe_counter!(
            "bulkhead_calls_permitted_total",
            "Total number of calls permitted through the bulkhead"
        );
        describe_counter!(
            "bulkhead_calls_rejected_total",
            "Total number of calls rejected by the bulkhead"
        );
        describe_gauge!(
            "bulkhead_concurrent_calls",
            "Current number of concurrent calls"
        );
        describe_gauge!(
            "bulkhead_queue_depth",
            "Tasks waiting for a thread-pool bulkhead worker"
        );
        describe_histogram!(
            "bulkhead_call_duration_seconds",
            "Duration of calls through the bulkhead"
        );
    });
}
