//! Ordered fallback resolution.

use crate::events::FallbackEvent;
use fortify_core::{find_cause, ErrorKind, EventPublisher, ResilienceError};
use futures::future::BoxFuture;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "metrics")]
use metrics::counter;

#[cfg(feature = "tracing")]
use tracing::debug;

/// Decides whether a handler applies to an error.
pub type FallbackPredicate<E> = Arc<dyn Fn(&ResilienceError<E>) -> bool + Send + Sync>;

type RecoverFn<T, E> = Arc<dyn Fn(&ResilienceError<E>) -> T + Send + Sync>;
type RecoverAsyncFn<T, E> =
    Arc<dyn Fn(ResilienceError<E>) -> BoxFuture<'static, Result<T, ResilienceError<E>>> + Send + Sync>;
type MapErrorFn<E> = Arc<dyn Fn(ResilienceError<E>) -> ResilienceError<E> + Send + Sync>;

/// What a matching handler does with the error.
pub enum FallbackStrategy<T, E> {
    /// Computes a replacement value from the error.
    Recover(RecoverFn<T, E>),
    /// Returns a copy of a fixed value.
    Value(Arc<dyn Fn() -> T + Send + Sync>),
    /// Runs an async continuation that may itself fail.
    RecoverAsync(RecoverAsyncFn<T, E>),
    /// Replaces the error with another error.
    MapError(MapErrorFn<E>),
}

impl<T, E> FallbackStrategy<T, E> {
    fn label(&self) -> &'static str {
        match self {
            FallbackStrategy::Recover(_) => "recover",
            FallbackStrategy::Value(_) => "value",
            FallbackStrategy::RecoverAsync(_) => "recover_async",
            FallbackStrategy::MapError(_) => "map_error",
        }
    }
}

impl<T, E> Clone for FallbackStrategy<T, E> {
    fn clone(&self) -> Self {
        match self {
            FallbackStrategy::Recover(f) => FallbackStrategy::Recover(Arc::clone(f)),
            FallbackStrategy::Value(f) => FallbackStrategy::Value(Arc::clone(f)),
            FallbackStrategy::RecoverAsync(f) => FallbackStrategy::RecoverAsync(Arc::clone(f)),
            FallbackStrategy::MapError(f) => FallbackStrategy::MapError(Arc::clone(f)),
        }
    }
}

struct Handler<T, E> {
    predicate: FallbackPredicate<E>,
    strategy: FallbackStrategy<T, E>,
}

/// An ordered list of `(predicate, strategy)` handlers.
///
/// On failure the first handler whose predicate matches is applied; when
/// none matches the original error is returned unchanged. Successful
/// results pass through untouched.
pub struct Fallback<T, E> {
    name: String,
    handlers: Vec<Handler<T, E>>,
    events: EventPublisher<FallbackEvent>,
}

impl<T, E> Fallback<T, E> {
    /// Starts an empty builder.
    pub fn builder(name: impl Into<String>) -> FallbackBuilder<T, E> {
        FallbackBuilder {
            name: name.into(),
            handlers: Vec::new(),
        }
    }

    /// The fallback's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handler is configured.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The publisher listeners can subscribe to.
    pub fn event_publisher(&self) -> &EventPublisher<FallbackEvent> {
        &self.events
    }

    /// Subscribes to every event.
    pub fn on_event<F>(&self, f: F)
    where
        F: Fn(&FallbackEvent) + Send + Sync + 'static,
    {
        self.events.subscribe_fn(f);
    }

    fn find(&self, err: &ResilienceError<E>) -> Option<(usize, &FallbackStrategy<T, E>)> {
        self.handlers
            .iter()
            .enumerate()
            .find(|(_, handler)| (handler.predicate)(err))
            .map(|(index, handler)| (index, &handler.strategy))
    }

    /// Resolves a result, blocking on async continuations.
    ///
    /// Async continuations run on `futures::executor::block_on`; do not call
    /// this from inside an async task when such a handler is configured.
    pub fn apply_sync(&self, result: Result<T, ResilienceError<E>>) -> Result<T, ResilienceError<E>> {
        futures::executor::block_on(self.apply(result))
    }

    /// Resolves a result.
    pub async fn apply(&self, result: Result<T, ResilienceError<E>>) -> Result<T, ResilienceError<E>> {
        let err = match result {
            Ok(value) => {
                self.events.emit(&FallbackEvent::Success {
                    pattern_name: self.name.clone(),
                    timestamp: Instant::now(),
                });
                return Ok(value);
            }
            Err(err) => err,
        };

        let Some((index, strategy)) = self.find(&err) else {
            self.skipped(&err);
            return Err(err);
        };
        self.applied(index, strategy.label());

        match strategy {
            FallbackStrategy::Recover(f) => Ok(f(&err)),
            FallbackStrategy::Value(f) => Ok(f()),
            FallbackStrategy::MapError(f) => Err(f(err)),
            FallbackStrategy::RecoverAsync(f) => {
                let recovered = f(err).await;
                if recovered.is_err() {
                    self.failed();
                }
                recovered
            }
        }
    }

    fn applied(&self, handler: usize, strategy: &'static str) {
        #[cfg(feature = "tracing")]
        debug!(fallback = %self.name, handler, strategy, "fallback applied");

        #[cfg(feature = "metrics")]
        counter!("fallback_calls_total", "fallback" => self.name.clone(), "outcome" => "applied", "strategy" => strategy)
            .increment(1);

        self.events.emit(&FallbackEvent::Applied {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
            handler,
            strategy,
        });
    }

    fn skipped(&self, _err: &ResilienceError<E>) {
        #[cfg(feature = "tracing")]
        debug!(fallback = %self.name, kind = %_err.kind(), "no fallback matched");

        #[cfg(feature = "metrics")]
        counter!("fallback_calls_total", "fallback" => self.name.clone(), "outcome" => "skipped")
            .increment(1);

        self.events.emit(&FallbackEvent::Skipped {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
        });
    }

    fn failed(&self) {
        #[cfg(feature = "metrics")]
        counter!("fallback_calls_total", "fallback" => self.name.clone(), "outcome" => "failed")
            .increment(1);

        self.events.emit(&FallbackEvent::Failed {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
        });
    }
}

impl<T, E> fmt::Debug for Fallback<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategies: Vec<_> = self.handlers.iter().map(|h| h.strategy.label()).collect();
        f.debug_struct("Fallback")
            .field("name", &self.name)
            .field("handlers", &strategies)
            .finish()
    }
}

/// Builder for [`Fallback`]: pick a predicate, then a strategy.
pub struct FallbackBuilder<T, E> {
    name: String,
    handlers: Vec<Handler<T, E>>,
}

impl<T, E> FallbackBuilder<T, E>
where
    E: 'static,
{
    /// Matches errors of any of `kinds`.
    ///
    /// An error matches if its own kind or the kind of its root cause is
    /// listed, so `Timeout` also matches a retry exhausted by timeouts.
    pub fn on_kinds<K>(self, kinds: K) -> When<T, E>
    where
        K: IntoIterator<Item = ErrorKind>,
    {
        let kinds: Vec<ErrorKind> = kinds.into_iter().collect();
        self.on(move |err: &ResilienceError<E>| {
            kinds.contains(&err.kind()) || kinds.contains(&err.root_cause().kind())
        })
    }

    /// Matches errors of `kind`.
    pub fn on_kind(self, kind: ErrorKind) -> When<T, E> {
        self.on_kinds([kind])
    }

    /// Matches every admission rejection (open circuit, full bulkhead, rate limit).
    pub fn on_admission_rejection(self) -> When<T, E> {
        self.on(|err: &ResilienceError<E>| err.root_cause().is_admission_rejection())
    }

    /// Matches errors whose `source()` chain contains an `X`.
    pub fn on_error<X>(self) -> When<T, E>
    where
        X: Error + 'static,
        E: Error,
    {
        self.on(|err: &ResilienceError<E>| find_cause::<X>(err).is_some())
    }

    /// Matches errors satisfying `predicate`.
    pub fn on<P>(self, predicate: P) -> When<T, E>
    where
        P: Fn(&ResilienceError<E>) -> bool + Send + Sync + 'static,
    {
        When {
            builder: self,
            predicate: Arc::new(predicate),
        }
    }

    /// Matches every error.
    pub fn otherwise(self) -> When<T, E> {
        self.on(|_: &ResilienceError<E>| true)
    }

    /// Builds the fallback.
    pub fn build(self) -> Fallback<T, E> {
        Fallback {
            name: self.name,
            handlers: self.handlers,
            events: EventPublisher::new(),
        }
    }
}

/// A predicate waiting for its strategy.
pub struct When<T, E> {
    builder: FallbackBuilder<T, E>,
    predicate: FallbackPredicate<E>,
}

impl<T, E> When<T, E> {
    /// Applies `strategy` to matching errors.
    pub fn then(mut self, strategy: FallbackStrategy<T, E>) -> FallbackBuilder<T, E> {
        self.builder.handlers.push(Handler {
            predicate: self.predicate,
            strategy,
        });
        self.builder
    }

    /// Recovers with a value computed from the error.
    pub fn recover<F>(self, f: F) -> FallbackBuilder<T, E>
    where
        F: Fn(&ResilienceError<E>) -> T + Send + Sync + 'static,
    {
        self.then(FallbackStrategy::Recover(Arc::new(f)))
    }

    /// Recovers with a copy of `value`.
    pub fn value(self, value: T) -> FallbackBuilder<T, E>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.then(FallbackStrategy::Value(Arc::new(move || value.clone())))
    }

    /// Recovers with an async continuation, e.g. a call to a backup service.
    pub fn recover_async<F, Fut>(self, f: F) -> FallbackBuilder<T, E>
    where
        F: Fn(ResilienceError<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'static,
    {
        self.then(FallbackStrategy::RecoverAsync(Arc::new(move |err| {
            Box::pin(f(err))
        })))
    }

    /// Replaces the error.
    pub fn map_error<F>(self, f: F) -> FallbackBuilder<T, E>
    where
        F: Fn(ResilienceError<E>) -> ResilienceError<E> + Send + Sync + 'static,
    {
        self.then(FallbackStrategy::MapError(Arc::new(f)))
    }
}
