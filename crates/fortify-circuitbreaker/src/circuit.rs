use crate::config::CircuitBreakerConfig;
use crate::error::CallNotPermitted;
use crate::events::CircuitBreakerEvent;
use crate::window::{CallRecord, Outcome, SlidingWindow, Snapshot};
use fortify_core::{EventPublisher, Registrable, ResilienceError};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "tracing")]
use tracing::{debug, info};

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Represents the state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CircuitState {
    /// Calls are allowed and outcomes are recorded.
    Closed = 0,
    /// Calls are rejected until the wait duration has elapsed.
    Open = 1,
    /// A limited number of trial calls are allowed.
    HalfOpen = 2,
    /// Calls are always rejected until an explicit transition.
    ForcedOpen = 3,
    /// Calls are always allowed and nothing is recorded.
    Disabled = 4,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            3 => CircuitState::ForcedOpen,
            4 => CircuitState::Disabled,
            _ => CircuitState::Closed,
        }
    }

    /// Upper-case name, as shown in errors and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
            CircuitState::ForcedOpen => "FORCED_OPEN",
            CircuitState::Disabled => "DISABLED",
        }
    }

    /// Returns true if outcomes are recorded in this state.
    fn records_outcomes(self) -> bool {
        matches!(self, CircuitState::Closed | CircuitState::HalfOpen)
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of circuit breaker metrics for observability.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CircuitBreakerMetrics {
    /// Current state.
    pub state: CircuitState,
    /// Failure rate of the buffered calls, `None` until enough calls were recorded.
    pub failure_rate: Option<f64>,
    /// Slow call rate of the buffered calls, `None` until enough calls were recorded.
    pub slow_call_rate: Option<f64>,
    /// Calls in the sliding window.
    pub buffered_calls: usize,
    /// Failed calls in the sliding window.
    pub failed_calls: usize,
    /// Successful calls in the sliding window.
    pub successful_calls: usize,
    /// Slow calls in the sliding window.
    pub slow_calls: usize,
    /// Slow failed calls in the sliding window.
    pub slow_failed_calls: usize,
    /// Calls rejected since creation or the last reset.
    pub not_permitted_calls: u64,
    /// Time spent in the current state.
    pub time_in_state: Duration,
}

struct Circuit {
    window: SlidingWindow,
}

type Transition = (CircuitState, CircuitState);

/// A named circuit breaker.
///
/// The permission check is lock-free: the state lives in an atomic and the
/// half-open trial budget is a CAS-decremented counter. Recording an outcome
/// takes a short-lived per-breaker lock around the sliding window only;
/// listeners are notified after the lock is released.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    half_open_permits: AtomicUsize,
    epoch: Instant,
    opened_at: AtomicU64,
    state_changed_at: AtomicU64,
    not_permitted: AtomicU64,
    circuit: Mutex<Circuit>,
    events: EventPublisher<CircuitBreakerEvent>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        #[cfg(feature = "metrics")]
        describe_metrics();

        let name = name.into();

        #[cfg(feature = "metrics")]
        gauge!("circuitbreaker_state", "circuitbreaker" => name.clone())
            .set(CircuitState::Closed as u8 as f64);

        Self {
            circuit: Mutex::new(Circuit {
                window: SlidingWindow::new(config.sliding_window_size),
            }),
            name,
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            half_open_permits: AtomicUsize::new(0),
            epoch: Instant::now(),
            opened_at: AtomicU64::new(0),
            state_changed_at: AtomicU64::new(0),
            not_permitted: AtomicU64::new(0),
            events: EventPublisher::new(),
        }
    }

    /// Creates a breaker with the default configuration.
    pub fn of_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// The breaker's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The breaker's configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// The publisher listeners can subscribe to.
    pub fn event_publisher(&self) -> &EventPublisher<CircuitBreakerEvent> {
        &self.events
    }

    /// Subscribes to every event.
    pub fn on_event<F>(&self, f: F)
    where
        F: Fn(&CircuitBreakerEvent) + Send + Sync + 'static,
    {
        self.events.subscribe_fn(f);
    }

    /// Subscribes to state transitions. The callback receives `(from, to)`.
    pub fn on_state_transition<F>(&self, f: F)
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let CircuitBreakerEvent::StateTransition {
                from_state,
                to_state,
                ..
            } = event
            {
                f(*from_state, *to_state);
            }
        });
    }

    /// Subscribes to rejected calls.
    pub fn on_call_not_permitted<F>(&self, f: F)
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let CircuitBreakerEvent::CallNotPermitted { state, .. } = event {
                f(*state);
            }
        });
    }

    /// Subscribes to recorded failures.
    pub fn on_error_recorded<F>(&self, f: F)
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let CircuitBreakerEvent::ErrorRecorded { duration, .. } = event {
                f(*duration);
            }
        });
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn load_state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn open_wait_elapsed(&self) -> bool {
        let opened_at = Duration::from_nanos(self.opened_at.load(Ordering::Acquire));
        self.epoch.elapsed() >= opened_at + self.config.wait_duration_in_open
    }

    /// Returns the current state.
    ///
    /// An open breaker whose wait duration has elapsed moves to half-open here.
    pub fn state(&self) -> CircuitState {
        let state = self.load_state();
        if state == CircuitState::Open && self.open_wait_elapsed() {
            self.transition_from(CircuitState::Open, CircuitState::HalfOpen);
            return self.load_state();
        }
        state
    }

    /// Asks for permission to run one call.
    ///
    /// Closed and disabled breakers always permit. Open breakers reject until
    /// the wait duration has elapsed, then move to half-open. Half-open
    /// breakers permit while trial calls remain. A granted half-open permit
    /// must later be settled with an `on_*` call or [`release_permission`].
    ///
    /// [`release_permission`]: Self::release_permission
    pub fn try_acquire_permission(&self) -> Result<(), CallNotPermitted> {
        loop {
            match self.load_state() {
                CircuitState::Closed | CircuitState::Disabled => return Ok(()),
                CircuitState::ForcedOpen => return Err(self.reject(CircuitState::ForcedOpen)),
                CircuitState::Open => {
                    if !self.open_wait_elapsed() {
                        return Err(self.reject(CircuitState::Open));
                    }
                    self.transition_from(CircuitState::Open, CircuitState::HalfOpen);
                }
                CircuitState::HalfOpen => {
                    let acquired = self
                        .half_open_permits
                        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| p.checked_sub(1))
                        .is_ok();
                    if acquired {
                        #[cfg(feature = "tracing")]
                        debug!(circuitbreaker = %self.name, "half-open trial call permitted");
                        return Ok(());
                    }
                    return Err(self.reject(CircuitState::HalfOpen));
                }
            }
        }
    }

    fn reject(&self, state: CircuitState) -> CallNotPermitted {
        self.not_permitted.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        debug!(circuitbreaker = %self.name, state = %state, "call not permitted");

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => self.name.clone(), "outcome" => "not_permitted")
            .increment(1);

        self.events.emit(&CircuitBreakerEvent::CallNotPermitted {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
            state,
        });
        CallNotPermitted {
            name: self.name.clone(),
            state,
        }
    }

    /// Gives back a permission that did not lead to a recorded outcome.
    pub fn release_permission(&self) {
        if self.load_state() == CircuitState::HalfOpen {
            let max = self.config.permitted_calls_in_half_open;
            let _ = self
                .half_open_permits
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| {
                    (p < max).then_some(p + 1)
                });
        }
    }

    /// Records a successful call.
    pub fn on_success(&self, duration: Duration) {
        self.record(Outcome::Success, duration);
    }

    /// Records a failed call, consulting the ignore and record predicates.
    pub fn on_error(&self, duration: Duration, error: &(dyn Error + 'static)) {
        if self.config.is_ignored(error) {
            self.release_permission();

            #[cfg(feature = "tracing")]
            debug!(circuitbreaker = %self.name, error = %error, "ignored error");

            self.events.emit(&CircuitBreakerEvent::IgnoredError {
                pattern_name: self.name.clone(),
                timestamp: Instant::now(),
                duration,
            });
            return;
        }
        if self.config.is_recorded(error) {
            self.record(Outcome::Failure, duration);
        } else {
            self.record(Outcome::Success, duration);
        }
    }

    /// Records the outcome of a decorated call.
    ///
    /// Application errors go through the predicates, timeouts are failures,
    /// and admission rejections from inner primitives are not recorded.
    /// Retry exhaustion is classified by its last failure.
    pub fn on_result<T, E>(&self, result: &Result<T, ResilienceError<E>>, duration: Duration)
    where
        E: Error + 'static,
    {
        match result {
            Ok(_) => self.on_success(duration),
            Err(err) => match err.root_cause() {
                ResilienceError::Application(e) => self.on_error(duration, e),
                ResilienceError::Timeout { .. } => self.record(Outcome::Failure, duration),
                _ => self.release_permission(),
            },
        }
    }

    fn record(&self, outcome: Outcome, duration: Duration) {
        let slow = duration >= self.config.slow_call_duration_threshold;
        let record = CallRecord {
            outcome,
            slow,
            duration,
        };

        let (state, snapshot, transition) = {
            let mut circuit = fortify_core::lock(&self.circuit);
            let state = self.load_state();
            if !state.records_outcomes() {
                return;
            }
            let snapshot = circuit.window.record(record);
            let target = match state {
                CircuitState::Closed => self.evaluate_closed(&snapshot),
                _ => self.evaluate_half_open(&snapshot),
            };
            let transition = target.and_then(|to| self.apply_transition(&mut circuit, to));
            (state, snapshot, transition)
        };

        self.emit_outcome(outcome, slow, duration, state);
        if let Some((_, CircuitState::Open)) = transition {
            self.emit_threshold_events(&snapshot);
        }
        if let Some(transition) = transition {
            self.announce(transition);
        }
    }

    fn rates_exceeded(&self, failure_rate: f64, slow_call_rate: f64) -> bool {
        failure_rate >= self.config.failure_rate_threshold
            || slow_call_rate >= self.config.slow_call_rate_threshold
    }

    fn evaluate_closed(&self, snapshot: &Snapshot) -> Option<CircuitState> {
        if snapshot.total_calls < self.config.minimum_number_of_calls {
            return None;
        }
        self.rates_exceeded(snapshot.failure_rate(), snapshot.slow_call_rate())
            .then_some(CircuitState::Open)
    }

    fn evaluate_half_open(&self, snapshot: &Snapshot) -> Option<CircuitState> {
        let permitted = self.config.permitted_calls_in_half_open as f64;
        // Trips early once the failures seen so far already decide the trial.
        let failed_share = snapshot.failed_calls as f64 / permitted;
        let slow_share = snapshot.slow_calls as f64 / permitted;
        if self.rates_exceeded(failed_share, slow_share) {
            return Some(CircuitState::Open);
        }
        if snapshot.total_calls >= self.config.permitted_calls_in_half_open {
            if self.rates_exceeded(snapshot.failure_rate(), snapshot.slow_call_rate()) {
                return Some(CircuitState::Open);
            }
            return Some(CircuitState::Closed);
        }
        None
    }

    fn emit_outcome(&self, outcome: Outcome, slow: bool, duration: Duration, state: CircuitState) {
        let now = Instant::now();
        if slow {
            #[cfg(feature = "metrics")]
            counter!("circuitbreaker_slow_calls_total", "circuitbreaker" => self.name.clone())
                .increment(1);

            self.events.emit(&CircuitBreakerEvent::SlowCallDetected {
                pattern_name: self.name.clone(),
                timestamp: now,
                duration,
                state,
            });
        }

        #[cfg(feature = "metrics")]
        {
            let label = match outcome {
                Outcome::Success => "success",
                Outcome::Failure => "failure",
            };
            counter!("circuitbreaker_calls_total", "circuitbreaker" => self.name.clone(), "outcome" => label)
                .increment(1);
            histogram!("circuitbreaker_call_duration_seconds", "circuitbreaker" => self.name.clone())
                .record(duration.as_secs_f64());
        }

        let event = match outcome {
            Outcome::Success => CircuitBreakerEvent::SuccessRecorded {
                pattern_name: self.name.clone(),
                timestamp: now,
                duration,
                state,
            },
            Outcome::Failure => CircuitBreakerEvent::ErrorRecorded {
                pattern_name: self.name.clone(),
                timestamp: now,
                duration,
                state,
            },
        };
        self.events.emit(&event);
    }

    fn emit_threshold_events(&self, snapshot: &Snapshot) {
        let failure_rate = snapshot.failure_rate();
        if failure_rate >= self.config.failure_rate_threshold {
            self.events.emit(&CircuitBreakerEvent::FailureRateExceeded {
                pattern_name: self.name.clone(),
                timestamp: Instant::now(),
                failure_rate,
            });
        }
        let slow_call_rate = snapshot.slow_call_rate();
        if slow_call_rate >= self.config.slow_call_rate_threshold {
            self.events.emit(&CircuitBreakerEvent::SlowCallRateExceeded {
                pattern_name: self.name.clone(),
                timestamp: Instant::now(),
                slow_call_rate,
            });
        }
    }

    /// Moves to `to` while holding the circuit lock. Same-state moves are no-ops.
    fn apply_transition(&self, circuit: &mut Circuit, to: CircuitState) -> Option<Transition> {
        let from = self.load_state();
        if from == to {
            return None;
        }
        circuit.window.clear();
        let now = self.now_nanos();
        match to {
            CircuitState::Open => self.opened_at.store(now, Ordering::Release),
            CircuitState::HalfOpen => self
                .half_open_permits
                .store(self.config.permitted_calls_in_half_open, Ordering::Release),
            _ => {}
        }
        self.state_changed_at.store(now, Ordering::Release);
        self.state.store(to as u8, Ordering::Release);
        Some((from, to))
    }

    /// Moves to `to` only if the breaker is currently in `expected`.
    fn transition_from(&self, expected: CircuitState, to: CircuitState) -> bool {
        let transition = {
            let mut circuit = fortify_core::lock(&self.circuit);
            if self.load_state() != expected {
                return false;
            }
            self.apply_transition(&mut circuit, to)
        };
        match transition {
            Some(transition) => {
                self.announce(transition);
                true
            }
            None => false,
        }
    }

    fn transition_to(&self, to: CircuitState) {
        let transition = {
            let mut circuit = fortify_core::lock(&self.circuit);
            self.apply_transition(&mut circuit, to)
        };
        if let Some(transition) = transition {
            self.announce(transition);
        }
    }

    fn announce(&self, (from_state, to_state): Transition) {
        #[cfg(feature = "tracing")]
        info!(circuitbreaker = %self.name, from = %from_state, to = %to_state, "circuit state transition");

        #[cfg(feature = "metrics")]
        {
            counter!(
                "circuitbreaker_transitions_total",
                "circuitbreaker" => self.name.clone(),
                "from" => from_state.as_str(),
                "to" => to_state.as_str()
            )
            .increment(1);
            gauge!("circuitbreaker_state", "circuitbreaker" => self.name.clone())
                .set(to_state as u8 as f64);
        }

        self.events.emit(&CircuitBreakerEvent::StateTransition {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
            from_state,
            to_state,
        });
    }

    /// Closes the breaker and clears the window.
    pub fn transition_to_closed_state(&self) {
        self.transition_to(CircuitState::Closed);
    }

    /// Opens the breaker; it moves to half-open after the wait duration.
    pub fn transition_to_open_state(&self) {
        self.transition_to(CircuitState::Open);
    }

    /// Starts a half-open trial immediately.
    pub fn transition_to_half_open_state(&self) {
        self.transition_to(CircuitState::HalfOpen);
    }

    /// Rejects every call until another explicit transition.
    pub fn transition_to_forced_open_state(&self) {
        self.transition_to(CircuitState::ForcedOpen);
    }

    /// Permits every call and records nothing until another explicit transition.
    pub fn transition_to_disabled_state(&self) {
        self.transition_to(CircuitState::Disabled);
    }

    /// Returns to a closed breaker with an empty window and zeroed counters.
    pub fn reset(&self) {
        let transition = {
            let mut circuit = fortify_core::lock(&self.circuit);
            let transition = self.apply_transition(&mut circuit, CircuitState::Closed);
            circuit.window.clear();
            self.not_permitted.store(0, Ordering::Relaxed);
            transition
        };
        if let Some(transition) = transition {
            self.announce(transition);
        }
        self.events.emit(&CircuitBreakerEvent::Reset {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
        });
    }

    /// Returns a point-in-time view of the breaker.
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.state();
        let snapshot = fortify_core::lock(&self.circuit).window.snapshot();
        let required = match state {
            CircuitState::HalfOpen => self.config.permitted_calls_in_half_open,
            _ => self.config.minimum_number_of_calls,
        };
        let evaluated = state.records_outcomes() && snapshot.total_calls >= required;
        let changed_at = Duration::from_nanos(self.state_changed_at.load(Ordering::Acquire));
        CircuitBreakerMetrics {
            state,
            failure_rate: evaluated.then(|| snapshot.failure_rate()),
            slow_call_rate: evaluated.then(|| snapshot.slow_call_rate()),
            buffered_calls: snapshot.total_calls,
            failed_calls: snapshot.failed_calls,
            successful_calls: snapshot.successful_calls(),
            slow_calls: snapshot.slow_calls,
            slow_failed_calls: snapshot.slow_failed_calls,
            not_permitted_calls: self.not_permitted.load(Ordering::Relaxed),
            time_in_state: self.epoch.elapsed().saturating_sub(changed_at),
        }
    }

    /// Runs a synchronous operation under the breaker.
    pub fn execute_sync<T, E, F>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        E: Error + 'static,
    {
        self.call_sync(|| f().map_err(ResilienceError::Application))
    }

    /// Runs an already-decorated synchronous operation under the breaker.
    pub fn call_sync<T, E, F>(&self, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, ResilienceError<E>>,
        E: Error + 'static,
    {
        let permit = self.acquire_call_permit()?;
        let result = f();
        permit.settle(&result);
        result
    }

    /// Runs a future under the breaker.
    pub async fn execute<T, E, Fut>(&self, future: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        self.call(async move { future.await.map_err(ResilienceError::Application) })
            .await
    }

    /// Runs an already-decorated future under the breaker.
    ///
    /// The future is not polled unless permission is granted.
    pub async fn call<T, E, Fut>(&self, future: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
        E: Error + 'static,
    {
        let permit = self.acquire_call_permit()?;
        let result = future.await;
        permit.settle(&result);
        result
    }

    /// Acquires a permission that is held until the call settles.
    ///
    /// Dropping the permit before [`CallPermit::settle`] records a failure,
    /// so a cancelled or panicking call still consumes its trial slot.
    pub(crate) fn acquire_call_permit(&self) -> Result<CallPermit<'_>, CallNotPermitted> {
        self.try_acquire_permission()?;
        Ok(CallPermit {
            breaker: self,
            start: Instant::now(),
            settled: false,
        })
    }
}

/// Permission for one call through a [`CircuitBreaker`].
pub(crate) struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    start: Instant,
    settled: bool,
}

impl CallPermit<'_> {
    /// Records the call's outcome.
    pub(crate) fn settle<T, E>(mut self, result: &Result<T, ResilienceError<E>>)
    where
        E: Error + 'static,
    {
        self.settled = true;
        self.breaker.on_result(result, self.start.elapsed());
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        #[cfg(feature = "tracing")]
        debug!(circuitbreaker = %self.breaker.name, "call abandoned before completion");

        self.breaker.record(Outcome::Failure, self.start.elapsed());
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.load_state())
            .field("config", &self.config)
            .finish()
    }
}

impl Registrable for CircuitBreaker {
    type Config = CircuitBreakerConfig;
    const KIND: &'static str = "circuitbreaker";

    fn create(name: &str, config: &CircuitBreakerConfig) -> Self {
        CircuitBreaker::new(name, config.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(feature = "metrics")]
fn describe_metrics() {
    METRICS_INIT.call_once(|| {
        describe_counter!(
            "circuitbreaker_calls_total",
            "Total number of calls through the circuit breaker, by outcome"
        );
        describe_counter!(
            "circuitbreaker_transitions_total",
            "Total number of circuit breaker state transitions"
        );
        describe_counter!(
            "circuitbreaker_slow_calls_total",
            "Total number of calls at or above the slow call duration threshold"
        );
        describe_gauge!(
            "circuitbreaker_state",
            "Current circuit breaker state (0=closed, 1=open, 2=half-open, 3=forced-open, 4=disabled)"
        );
        describe_histogram!(
            "circuitbreaker_call_duration_seconds",
            "Duration of recorded calls"
        );
    });
}
