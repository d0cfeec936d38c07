//! Circuit breaker for fortify.
//!
//! A circuit breaker stops calling a failing dependency once the failure or
//! slow-call rate of its recent calls crosses a threshold, and probes for
//! recovery with a limited number of trial calls.
//!
//! ## States
//! - **Closed**: calls pass and their outcomes fill a count-based sliding window
//! - **Open**: calls are rejected until `wait_duration_in_open` has elapsed
//! - **Half-Open**: `permitted_calls_in_half_open` trial calls decide between
//!   closing again and re-opening
//! - **Forced-Open** / **Disabled**: administrative overrides that always
//!   reject, or always permit and record nothing
//!
//! ## Usage
//!
//! ```rust
//! use fortify_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new(
//!     "backendA",
//!     CircuitBreakerConfig::builder()
//!         .failure_rate_threshold(0.5)
//!         .sliding_window_size(4)
//!         .minimum_number_of_calls(4)
//!         .wait_duration_in_open(Duration::from_secs(5))
//!         .build(),
//! );
//!
//! for ok in [false, false, true, true] {
//!     let _ = breaker.execute_sync(|| if ok { Ok(()) } else { Err(std::io::Error::other("boom")) });
//! }
//! assert_eq!(breaker.state(), CircuitState::Open);
//! assert!(breaker.try_acquire_permission().is_err());
//! ```
//!
//! ## Tower
//!
//! [`CircuitBreakerLayer`] guards a tower service with a shared breaker.

mod circuit;
mod config;
mod error;
mod events;
mod layer;
pub mod window;

pub use circuit::{CircuitBreaker, CircuitBreakerMetrics, CircuitState};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CallNotPermitted;
pub use events::CircuitBreakerEvent;
pub use layer::{CircuitBreakerLayer, CircuitBreakerService};
pub use window::{CallRecord, Outcome, SlidingWindow, Snapshot};
