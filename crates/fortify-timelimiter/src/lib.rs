//! Time limiter for fortify.
//!
//! [`TimeLimiter`] fails a call with
//! [`ResilienceError::Timeout`](fortify_core::ResilienceError::Timeout) if it
//! has not finished within `timeout_duration`. With `cancel_running_future`
//! the expired future is dropped (or queued work withdrawn); without it the
//! work runs on and its result is discarded. Work already running on an OS
//! thread is never interrupted: the caller only stops waiting for it.
//!
//! ## Usage
//!
//! ```rust
//! use fortify_timelimiter::{TimeLimiter, TimeLimiterConfig};
//! use std::time::Duration;
//!
//! let limiter = TimeLimiter::new(
//!     "slow-backend",
//!     TimeLimiterConfig::builder()
//!         .timeout_duration(Duration::from_millis(20))
//!         .build(),
//! );
//!
//! let err = limiter
//!     .execute_sync(|| {
//!         std::thread::sleep(Duration::from_millis(200));
//!         Ok::<_, std::io::Error>(())
//!     })
//!     .unwrap_err();
//! assert!(err.is_timeout());
//! ```

mod config;
mod error;
mod events;
mod layer;
mod limiter;

pub use config::{TimeLimiterConfig, TimeLimiterConfigBuilder};
pub use error::TimeoutError;
pub use events::TimeLimiterEvent;
pub use layer::{TimeLimiterLayer, TimeLimiterService};
pub use limiter::TimeLimiter;
