//! Composable fault tolerance for Rust.
//!
//! `fortify` bundles five resilience primitives, a fallback resolver, one
//! registry per primitive kind and a composer that chains them around an
//! operation:
//!
//! - [`CircuitBreaker`]: stops calling a failing dependency, probes it again
//!   after a wait
//! - [`Bulkhead`] and [`ThreadPoolBulkhead`]: cap concurrent executions
//! - [`RateLimiter`]: admits a fixed number of calls per refresh period
//! - [`Retry`]: repeats failed attempts with a configurable interval
//! - [`TimeLimiter`]: bounds how long a caller waits
//! - [`Fallback`]: turns selected failures into values
//!
//! Every decorated call resolves to [`ResilienceError<E>`], whose
//! [`kind`](ResilienceError::kind) tells admission rejections, timeouts,
//! retry exhaustion and application failures apart.
//!
//! # Composing
//!
//! ```
//! use fortify::{
//!     Bulkhead, CircuitBreaker, Decorators, ErrorKind, Fallback, ResilienceRegistries,
//! };
//! use std::sync::Arc;
//!
//! let registries = ResilienceRegistries::new();
//! let breaker = registries.circuit_breakers().get_or_create("pricing");
//! let bulkhead = registries.bulkheads().get_or_create("pricing");
//! breaker.transition_to_forced_open_state();
//!
//! let price = Decorators::of_supplier(|| Ok::<_, std::io::Error>(100))
//!     .with_bulkhead(bulkhead)
//!     .with_circuit_breaker(breaker)
//!     .with_fallback(Arc::new(
//!         Fallback::<i32, std::io::Error>::builder("pricing")
//!             .on_kind(ErrorKind::CallNotPermitted)
//!             .value(90)
//!             .build(),
//!     ))
//!     .decorate();
//!
//! assert_eq!(price.invoke().unwrap(), 90);
//! ```
//!
//! # Tower
//!
//! Each primitive also ships a tower `Layer` driving a shared instance, so a
//! registry's circuit breaker can guard a tower service as well as a
//! decorated closure.
//!
//! # Feature Flags
//!
//! - `metrics`: counters, gauges and histograms via the `metrics` facade
//! - `tracing`: structured logs via `tracing`
//! - `layer`: `ResilienceErrorLayer` for lifting plain services
//! - `serde`: serialize circuit breaker state and snapshots

mod decorators;
mod registries;

pub use decorators::{
    Decorate, Decorated, DecoratedFuture, Decorators, FutureSupplier, Supplier,
};
pub use registries::{ResilienceRegistries, ResilienceRegistriesBuilder};

pub use fortify_bulkhead::{
    Bulkhead, BulkheadConfig, BulkheadEvent, BulkheadFullError, BulkheadLayer, BulkheadMetrics,
    BulkheadTask, ThreadPoolBulkhead, ThreadPoolBulkheadConfig, ThreadPoolBulkheadMetrics,
};
pub use fortify_circuitbreaker::{
    CallNotPermitted, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerEvent,
    CircuitBreakerLayer, CircuitBreakerMetrics, CircuitState,
};
pub use fortify_core::{
    find_cause, ErrorKind, EventListener, EventPublisher, Registrable, Registry, RegistryEvent,
    ResilienceError, ResilienceEvent,
};
pub use fortify_fallback::{Fallback, FallbackEvent, FallbackLayer, FallbackStrategy};
pub use fortify_ratelimiter::{
    RateLimiter, RateLimiterConfig, RateLimiterEvent, RateLimiterLayer, RateLimiterMetrics,
    RequestNotPermitted,
};
pub use fortify_retry::{
    ExponentialBackoff, ExponentialRandomBackoff, FixedInterval, IntervalFunction, Retry,
    RetryConfig, RetryEvent, RetryLayer, RetryMetrics,
};
pub use fortify_timelimiter::{
    TimeLimiter, TimeLimiterConfig, TimeLimiterEvent, TimeLimiterLayer, TimeoutError,
};
