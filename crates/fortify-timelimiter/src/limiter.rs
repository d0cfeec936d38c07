//! Deadline enforcement.
//!
//! Async calls race the future against `tokio::time::timeout`. Synchronous
//! calls run on a helper thread and the caller waits on its completion with
//! a deadline. Either way an expired call resolves to
//! [`ResilienceError::Timeout`]; whether the work itself is stopped depends
//! on `cancel_running_future`.

use crate::config::TimeLimiterConfig;
use crate::error::TimeoutError;
use crate::events::TimeLimiterEvent;
use fortify_core::promise::{self, Pending, Promise, WaitError};
use fortify_core::{EventPublisher, Registrable, ResilienceError};
use std::fmt;
use std::future::Future;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Bounds how long a call may take.
pub struct TimeLimiter {
    name: String,
    config: TimeLimiterConfig,
    helpers: AtomicUsize,
    events: EventPublisher<TimeLimiterEvent>,
}

impl TimeLimiter {
    /// Creates a time limiter.
    pub fn new(name: impl Into<String>, config: TimeLimiterConfig) -> Self {
        #[cfg(feature = "metrics")]
        describe_metrics();

        Self {
            name: name.into(),
            config,
            helpers: AtomicUsize::new(0),
            events: EventPublisher::new(),
        }
    }

    /// Creates a time limiter with the default configuration.
    pub fn of_defaults(name: impl Into<String>) -> Self {
        Self::new(name, TimeLimiterConfig::default())
    }

    /// The time limiter's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The time limiter's configuration.
    pub fn config(&self) -> &TimeLimiterConfig {
        &self.config
    }

    /// The publisher listeners can subscribe to.
    pub fn event_publisher(&self) -> &EventPublisher<TimeLimiterEvent> {
        &self.events
    }

    /// Subscribes to every event.
    pub fn on_event<F>(&self, f: F)
    where
        F: Fn(&TimeLimiterEvent) + Send + Sync + 'static,
    {
        self.events.subscribe_fn(f);
    }

    /// Subscribes to timeouts.
    pub fn on_timeout<F>(&self, f: F)
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.events.subscribe_fn(move |event| {
            if let TimeLimiterEvent::Timeout { timeout, .. } = event {
                f(*timeout);
            }
        });
    }

    /// Runs a future with the deadline.
    ///
    /// Without `cancel_running_future` the future is spawned on the current
    /// tokio runtime so it can finish after the deadline.
    pub async fn execute<T, E, Fut>(&self, future: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.call(async move { future.await.map_err(ResilienceError::Application) })
            .await
    }

    /// Runs an already-decorated future with the deadline.
    pub async fn call<T, E, Fut>(&self, future: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let timeout = self.config.timeout_duration;
        let start = Instant::now();

        let outcome = if self.config.cancel_running_future {
            tokio::time::timeout(timeout, future).await.ok()
        } else {
            let mut handle = tokio::spawn(future);
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(result)) => Some(result),
                Ok(Err(join)) if join.is_panic() => panic::resume_unwind(join.into_panic()),
                // runtime shutting down
                Ok(Err(_)) => None,
                // dropping the handle detaches the task
                Err(_) => None,
            }
        };

        self.settle(outcome, start)
    }

    /// Runs a synchronous operation on a helper thread with the deadline.
    ///
    /// On expiry the caller stops waiting. The helper thread cannot be
    /// interrupted and finishes in the background; its result is dropped.
    pub fn execute_sync<T, E, F>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.call_sync(move || f().map_err(ResilienceError::Application))
    }

    /// Runs an already-decorated synchronous operation with the deadline.
    pub fn call_sync<T, E, F>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, ResilienceError<E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (promise, mut completion) = promise::channel();
        let id = self.helpers.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let builder = thread::Builder::new().name(format!("{}-timelimiter-{}", self.name, id));
        if let Err(_err) = start_helper(builder, promise, f) {
            #[cfg(feature = "tracing")]
            warn!(timelimiter = %self.name, error = %_err, "no helper thread, ran call inline");
        }

        let waited = completion.wait_until(start + self.config.timeout_duration);
        if waited.is_err() {
            self.abandon(completion);
        }
        let outcome = match waited {
            Ok(Ok(result)) => Some(result),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => None,
        };
        self.settle(outcome, start)
    }

    /// Waits for `pending` with the deadline.
    ///
    /// Used for work already running elsewhere, such as a thread-pool
    /// bulkhead task. On expiry the work is cancelled if configured,
    /// otherwise detached.
    pub fn wait_sync<T, E, P>(&self, mut pending: P) -> Result<T, ResilienceError<E>>
    where
        P: Pending<Output = Result<T, ResilienceError<E>>>,
    {
        let start = Instant::now();
        let outcome = match pending.wait_until(start + self.config.timeout_duration) {
            Ok(result) => Some(result),
            Err(WaitError::TimedOut | WaitError::Abandoned) => {
                self.abandon(pending);
                None
            }
        };
        self.settle(outcome, start)
    }

    fn abandon<P: Pending>(&self, pending: P) {
        if self.config.cancel_running_future {
            pending.cancel();
        } else {
            pending.detach();
        }
    }

    fn settle<T, E>(
        &self,
        outcome: Option<Result<T, ResilienceError<E>>>,
        start: Instant,
    ) -> Result<T, ResilienceError<E>> {
        let duration = start.elapsed();
        match outcome {
            Some(Ok(value)) => {
                self.finished(duration, true);
                Ok(value)
            }
            Some(Err(err)) => {
                self.finished(duration, false);
                Err(err)
            }
            None => Err(self.timed_out().into()),
        }
    }

    fn finished(&self, duration: Duration, success: bool) {
        #[cfg(feature = "metrics")]
        {
            let outcome = if success { "success" } else { "error" };
            counter!("timelimiter_calls_total", "timelimiter" => self.name.clone(), "outcome" => outcome)
                .increment(1);
            histogram!("timelimiter_call_duration_seconds", "timelimiter" => self.name.clone())
                .record(duration.as_secs_f64());
        }

        #[cfg(feature = "tracing")]
        debug!(timelimiter = %self.name, success, duration_ms = duration.as_millis() as u64, "call finished in time");

        let pattern_name = self.name.clone();
        let timestamp = Instant::now();
        self.events.emit(&if success {
            TimeLimiterEvent::Success {
                pattern_name,
                timestamp,
                duration,
            }
        } else {
            TimeLimiterEvent::Error {
                pattern_name,
                timestamp,
                duration,
            }
        });
    }

    fn timed_out(&self) -> TimeoutError {
        let timeout = self.config.timeout_duration;

        #[cfg(feature = "metrics")]
        counter!("timelimiter_calls_total", "timelimiter" => self.name.clone(), "outcome" => "timeout")
            .increment(1);

        #[cfg(feature = "tracing")]
        warn!(timelimiter = %self.name, timeout_ms = timeout.as_millis() as u64, "call timed out");

        self.events.emit(&TimeLimiterEvent::Timeout {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
            timeout,
        });
        TimeoutError {
            name: self.name.clone(),
            timeout,
        }
    }
}

impl fmt::Debug for TimeLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeLimiter")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

impl Registrable for TimeLimiter {
    type Config = TimeLimiterConfig;
    const KIND: &'static str = "timelimiter";

    fn create(name: &str, config: &TimeLimiterConfig) -> Self {
        TimeLimiter::new(name, config.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(feature = "metrics")]
fn describe_metrics() {
    METRICS_INIT.call_once(|| {
        describe_counter!(
            "timelimiter_calls_total",
            "Total number of calls, labelled by outcome (success, error, timeout)"
        );
        describe_histogram!(
            "timelimiter_call_duration_seconds",
            "Duration of calls that finished before the deadline"
        );
    });
}

/// Runs `f` on a thread from `builder`, or inline when no thread can be
/// spawned. Either way `promise` is settled unless it was cancelled.
fn start_helper<R, F>(
    builder: thread::Builder,
    promise: Promise<thread::Result<R>>,
    f: F,
) -> io::Result<()>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let job = Arc::new(Mutex::new(Some((promise, f))));
    let shared = Arc::clone(&job);
    let spawned = builder.spawn(move || {
        let taken = fortify_core::lock(&shared).take();
        if let Some((promise, f)) = taken {
            run_job(promise, f);
        }
    });

    match spawned {
        Ok(_) => Ok(()),
        Err(err) => {
            let taken = fortify_core::lock(&job).take();
            if let Some((promise, f)) = taken {
                run_job(promise, f);
            }
            Err(err)
        }
    }
}

fn run_job<R, F: FnOnce() -> R>(promise: Promise<thread::Result<R>>, f: F) {
    if !promise.is_cancelled() {
        promise.complete(panic::catch_unwind(AssertUnwindSafe(f)));
    }
}
