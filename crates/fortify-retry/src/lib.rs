//! Retry for fortify.
//!
//! [`Retry`] re-runs a failed call up to `max_attempts` times (the first
//! call included), waiting `interval(attempt)` between attempts.
//!
//! - Ignored errors propagate immediately.
//! - Admission rejections (open circuit, full bulkhead, rate limit) are
//!   never retried.
//! - Timeouts are retried unless `retry_on_timeouts(false)` is set.
//! - When attempts run out the last error is wrapped in
//!   [`ResilienceError::RetryExhausted`](fortify_core::ResilienceError::RetryExhausted).
//!
//! Backoff policies:
//! - [`FixedInterval`] (the default, 500ms)
//! - [`ExponentialBackoff`] with optional cap
//! - [`ExponentialRandomBackoff`] with a randomization factor
//! - [`FnInterval`] for anything else
//!
//! ## Usage
//!
//! ```rust
//! use fortify_retry::{Retry, RetryConfig};
//! use std::cell::Cell;
//! use std::time::Duration;
//!
//! let retry = Retry::new(
//!     "backendA",
//!     RetryConfig::builder()
//!         .max_attempts(3)
//!         .wait_duration(Duration::from_millis(10))
//!         .build(),
//! );
//!
//! let calls = Cell::new(0);
//! let result = retry.execute_sync(|| {
//!     calls.set(calls.get() + 1);
//!     if calls.get() < 3 {
//!         Err(std::io::Error::other("flaky"))
//!     } else {
//!         Ok("done")
//!     }
//! });
//! assert_eq!(result.unwrap(), "done");
//! assert_eq!(retry.metrics().successful_calls_with_retry, 1);
//! ```

mod backoff;
mod config;
mod events;
mod layer;
mod retry;

pub use backoff::{
    ExponentialBackoff, ExponentialRandomBackoff, FixedInterval, FnInterval, IntervalFunction,
};
pub use config::{ResultPredicate, RetryConfig, RetryConfigBuilder};
pub use events::RetryEvent;
pub use layer::{RetryLayer, RetryService};
pub use retry::{Retry, RetryMetrics};
