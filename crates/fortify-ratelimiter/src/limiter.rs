//! Fixed-period rate limiter.
//!
//! Time is divided into periods of `limit_refresh_period` counted from the
//! limiter's creation. The current cycle number and the permits left in it
//! are packed into one `AtomicU64` and updated with compare-and-swap, so
//! refresh and consumption are a single atomic step. Permits may go negative:
//! a caller willing to wait reserves a permit from a later period, and those
//! reservations are paid back before later periods hand out anything new.

use crate::config::RateLimiterConfig;
use crate::error::RequestNotPermitted;
use crate::events::RateLimiterEvent;
use fortify_core::{EventPublisher, Registrable, ResilienceError};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "tracing")]
use tracing::debug;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Point-in-time view of a rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterMetrics {
    /// Permits left in the current period.
    pub available_permissions: usize,
    /// Calls currently sleeping on a reserved permit.
    pub number_of_waiting_calls: usize,
    /// Start of the next period.
    pub next_refresh: std::time::Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct State {
    cycle: u32,
    permits: i32,
}

impl State {
    fn pack(self) -> u64 {
        (u64::from(self.cycle) << 32) | u64::from(self.permits as u32)
    }

    fn unpack(raw: u64) -> Self {
        State {
            cycle: (raw >> 32) as u32,
            permits: raw as u32 as i32,
        }
    }
}

fn as_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Decrements the waiting-call count when dropped.
struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Waiting(counter)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Admits at most `limit_for_period` calls per period.
pub struct RateLimiter {
    name: String,
    limit_refresh_period: Duration,
    period_nanos: u64,
    limit_for_period: AtomicUsize,
    timeout_nanos: AtomicU64,
    epoch: tokio::time::Instant,
    state: AtomicU64,
    waiting: AtomicUsize,
    events: EventPublisher<RateLimiterEvent>,
}

impl RateLimiter {
    /// Creates a limiter whose first period starts now, with every permit free.
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        #[cfg(feature = "metrics")]
        describe_metrics();

        let initial = State {
            cycle: 0,
            permits: i32::try_from(config.limit_for_period).unwrap_or(i32::MAX),
        };
        Self {
            name: name.into(),
            limit_refresh_period: config.limit_refresh_period,
            period_nanos: as_nanos(config.limit_refresh_period).max(1),
            limit_for_period: AtomicUsize::new(config.limit_for_period),
            timeout_nanos: AtomicU64::new(as_nanos(config.timeout_duration)),
            epoch: tokio::time::Instant::now(),
            state: AtomicU64::new(initial.pack()),
            waiting: AtomicUsize::new(0),
            events: EventPublisher::new(),
        }
    }

    /// Creates a limiter with the default configuration.
    pub fn of_defaults(name: impl Into<String>) -> Self {
        Self::new(name, RateLimiterConfig::default())
    }

    /// The limiter's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current configuration, including runtime changes.
    pub fn config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            limit_for_period: self.limit_for_period(),
            limit_refresh_period: self.limit_refresh_period,
            timeout_duration: self.timeout_duration(),
        }
    }

    /// Permits per period.
    pub fn limit_for_period(&self) -> usize {
        self.limit_for_period.load(Ordering::SeqCst)
    }

    /// Longest a caller waits for a permit.
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_nanos(self.timeout_nanos.load(Ordering::SeqCst))
    }

    /// The publisher listeners can subscribe to.
    pub fn event_publisher(&self) -> &EventPublisher<RateLimiterEvent> {
        &self.events
    }

    /// Subscribes to every event.
    pub fn on_event<F>(&self, f: F)
    where
        F: Fn(&RateLimiterEvent) + Send + Sync + 'static,
    {
        self.events.subscribe_fn(f);
    }

    /// Changes the permits per period, starting with the next period.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is zero or does not fit in an `i32`.
    pub fn change_limit_for_period(&self, limit: usize) {
        assert!(limit > 0, "limit_for_period must be greater than 0");
        assert!(
            i32::try_from(limit).is_ok(),
            "limit_for_period must not exceed i32::MAX"
        );
        self.limit_for_period.store(limit, Ordering::SeqCst);

        #[cfg(feature = "tracing")]
        debug!(ratelimiter = %self.name, limit, "limit for period changed");
    }

    /// Changes how long later callers wait for a permit.
    pub fn change_timeout_duration(&self, timeout: Duration) {
        self.timeout_nanos.store(as_nanos(timeout), Ordering::SeqCst);
    }

    fn elapsed_nanos(&self) -> u64 {
        as_nanos(self.epoch.elapsed())
    }

    /// Applies every refresh between the stored cycle and `now_cycle`.
    ///
    /// Callers read the clock after loading the state they replace, so the
    /// stored cycle is never ahead of `now_cycle`. Only its low 32 bits are
    /// kept: an idle gap of an exact multiple of 2^32 periods skips one
    /// refresh, any other gap refills.
    fn refreshed(&self, state: State, now_cycle: u64) -> State {
        let current = now_cycle as u32;
        let elapsed = current.wrapping_sub(state.cycle);
        if elapsed == 0 {
            return state;
        }
        let limit = self.limit_for_period() as i64;
        let permits = (i64::from(state.permits) + limit.saturating_mul(i64::from(elapsed))).min(limit);
        State {
            cycle: current,
            permits: permits as i32,
        }
    }

    fn nanos_to_wait(&self, state: State, now: u64, now_cycle: u64) -> u64 {
        if state.permits > 0 {
            return 0;
        }
        let next_cycle_start = now_cycle.saturating_add(1).saturating_mul(self.period_nanos);
        let to_next_cycle = next_cycle_start.saturating_sub(now);
        let needed = (1 - i64::from(state.permits)) as u64;
        let cycles = needed.div_ceil(self.limit_for_period() as u64);
        to_next_cycle.saturating_add((cycles - 1).saturating_mul(self.period_nanos))
    }

    /// Takes a permit if one is available now or within `timeout`.
    ///
    /// Returns how long the caller must wait before using the permit, or
    /// the wait that would have been needed.
    fn reserve(&self, timeout: Duration) -> Result<Duration, Duration> {
        let timeout = as_nanos(timeout);
        let mut raw = self.state.load(Ordering::SeqCst);
        loop {
            let now = self.elapsed_nanos();
            let now_cycle = now / self.period_nanos;
            let current = self.refreshed(State::unpack(raw), now_cycle);
            let wait = self.nanos_to_wait(current, now, now_cycle);

            let reserved = if wait <= timeout {
                current.permits.checked_sub(1)
            } else {
                None
            };
            let next = State {
                permits: reserved.unwrap_or(current.permits),
                ..current
            };

            match self
                .state
                .compare_exchange_weak(raw, next.pack(), Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) if reserved.is_some() => return Ok(Duration::from_nanos(wait)),
                Ok(_) => return Err(Duration::from_nanos(wait)),
                Err(actual) => raw = actual,
            }
        }
    }

    /// Takes a permit only if one is free in the current period.
    pub fn try_acquire_permission(&self) -> Result<(), RequestNotPermitted> {
        match self.reserve(Duration::ZERO) {
            Ok(_) => {
                self.acquired(Duration::ZERO);
                Ok(())
            }
            Err(_) => Err(self.rejected(Duration::ZERO)),
        }
    }

    /// Takes a permit, blocking the thread until its period starts.
    ///
    /// Rejects without waiting when the permit would only become available
    /// after `timeout_duration`.
    pub fn acquire_permission(&self) -> Result<(), RequestNotPermitted> {
        let timeout = self.timeout_duration();
        let wait = self.reserve(timeout).map_err(|_| self.rejected(timeout))?;
        if !wait.is_zero() {
            let _waiting = Waiting::enter(&self.waiting);
            std::thread::sleep(wait);
        }
        self.acquired(wait);
        Ok(())
    }

    /// Takes a permit, sleeping on the tokio timer until its period starts.
    ///
    /// A reserved permit is spent even if the future is dropped while
    /// sleeping.
    pub async fn acquire_permission_async(&self) -> Result<(), RequestNotPermitted> {
        let timeout = self.timeout_duration();
        let wait = self.reserve(timeout).map_err(|_| self.rejected(timeout))?;
        if !wait.is_zero() {
            let _waiting = Waiting::enter(&self.waiting);
            tokio::time::sleep(wait).await;
        }
        self.acquired(wait);
        Ok(())
    }

    /// Discards the permits left in the current period.
    pub fn drain_permissions(&self) {
        let mut raw = self.state.load(Ordering::SeqCst);
        let discarded = loop {
            let now_cycle = self.elapsed_nanos() / self.period_nanos;
            let current = self.refreshed(State::unpack(raw), now_cycle);
            let next = State {
                permits: current.permits.min(0),
                ..current
            };
            match self
                .state
                .compare_exchange_weak(raw, next.pack(), Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break current.permits.max(0) as usize,
                Err(actual) => raw = actual,
            }
        };

        #[cfg(feature = "tracing")]
        debug!(ratelimiter = %self.name, discarded, "rate limiter drained");

        self.events.emit(&RateLimiterEvent::Drained {
            pattern_name: self.name.clone(),
            timestamp: std::time::Instant::now(),
            discarded_permits: discarded,
        });
    }

    /// Current permits, waiting callers and next refresh.
    pub fn metrics(&self) -> RateLimiterMetrics {
        let stored = State::unpack(self.state.load(Ordering::SeqCst));
        let now_cycle = self.elapsed_nanos() / self.period_nanos;
        let current = self.refreshed(stored, now_cycle);
        let next_refresh = self.epoch
            + Duration::from_nanos(now_cycle.saturating_add(1).saturating_mul(self.period_nanos));
        RateLimiterMetrics {
            available_permissions: current.permits.max(0) as usize,
            number_of_waiting_calls: self.waiting.load(Ordering::SeqCst),
            next_refresh: next_refresh.into_std(),
        }
    }

    fn acquired(&self, wait: Duration) {
        #[cfg(feature = "tracing")]
        if !wait.is_zero() {
            debug!(ratelimiter = %self.name, wait_ms = wait.as_millis() as u64, "permit acquired after waiting");
        }

        #[cfg(feature = "metrics")]
        {
            counter!("ratelimiter_calls_permitted_total", "ratelimiter" => self.name.clone())
                .increment(1);
            histogram!("ratelimiter_wait_duration_seconds", "ratelimiter" => self.name.clone())
                .record(wait.as_secs_f64());
            gauge!("ratelimiter_waiting_calls", "ratelimiter" => self.name.clone())
                .set(self.waiting.load(Ordering::SeqCst) as f64);
        }

        self.events.emit(&RateLimiterEvent::SuccessfulAcquire {
            pattern_name: self.name.clone(),
            timestamp: std::time::Instant::now(),
            wait_duration: wait,
        });
    }

    fn rejected(&self, timeout: Duration) -> RequestNotPermitted {
        #[cfg(feature = "tracing")]
        debug!(ratelimiter = %self.name, timeout_ms = timeout.as_millis() as u64, "request not permitted");

        #[cfg(feature = "metrics")]
        counter!("ratelimiter_calls_rejected_total", "ratelimiter" => self.name.clone())
            .increment(1);

        self.events.emit(&RateLimiterEvent::FailedAcquire {
            pattern_name: self.name.clone(),
            timestamp: std::time::Instant::now(),
            timeout,
        });
        RequestNotPermitted {
            name: self.name.clone(),
        }
    }

    /// Runs a synchronous operation once a permit is granted.
    pub fn execute_sync<T, E, F>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.call_sync(|| f().map_err(ResilienceError::Application))
    }

    /// Runs an already-decorated synchronous operation once a permit is granted.
    pub fn call_sync<T, E, F>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, ResilienceError<E>>,
    {
        self.acquire_permission()?;
        f()
    }

    /// Runs a future once a permit is granted.
    pub async fn execute<T, E, Fut>(&self, future: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        self.call(async move { future.await.map_err(ResilienceError::Application) })
            .await
    }

    /// Runs an already-decorated future once a permit is granted.
    pub async fn call<T, E, Fut>(&self, future: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        self.acquire_permission_async().await?;
        future.await
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("limit_for_period", &self.limit_for_period())
            .field("limit_refresh_period", &self.limit_refresh_period)
            .field("metrics", &self.metrics())
            .finish()
    }
}

impl Registrable for RateLimiter {
    type Config = RateLimiterConfig;
    const KIND: &'static str = "ratelimiter";

    fn create(name: &str, config: &RateLimiterConfig) -> Self {
        RateLimiter::new(name, config.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(feature = "metrics")]
fn describe_metrics() {
    METRICS_INIT.call_once(|| {
        describe_counter!(
            "ratelimiter_calls_permitted_total",
            "Total number of calls granted a permit"
        );
        describe_counter!(
            "ratelimiter_calls_rejected_total",
            "Total number of calls rejected by the rate limiter"
        );
        describe_gauge!(
            "ratelimiter_waiting_calls",
            "Calls currently waiting for a reserved permit"
        );
        describe_histogram!(
            "ratelimiter_wait_duration_seconds",
            "Time spent waiting for a permit"
        );
    });
}
