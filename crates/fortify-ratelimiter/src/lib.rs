//! Rate limiter for fortify.
//!
//! Admits at most `limit_for_period` calls in each `limit_refresh_period`.
//! Periods follow a fixed schedule anchored at the limiter's creation; at
//! every boundary the permits reset to the limit. A caller that finds none
//! left may wait for a later period, as long as the wait fits within
//! `timeout_duration`; otherwise it is rejected with [`RequestNotPermitted`].
//!
//! ## Usage
//!
//! ```rust
//! use fortify_ratelimiter::{RateLimiter, RateLimiterConfig};
//! use std::time::Duration;
//!
//! let limiter = RateLimiter::new(
//!     "search",
//!     RateLimiterConfig::builder()
//!         .limit_for_period(2)
//!         .limit_refresh_period(Duration::from_secs(60))
//!         .timeout_duration(Duration::ZERO)
//!         .build(),
//! );
//!
//! assert!(limiter.try_acquire_permission().is_ok());
//! assert!(limiter.try_acquire_permission().is_ok());
//! assert!(limiter.try_acquire_permission().is_err());
//! ```

mod config;
mod error;
mod events;
mod layer;
mod limiter;

pub use config::{RateLimiterConfig, RateLimiterConfigBuilder};
pub use error::RequestNotPermitted;
pub use events::RateLimiterEvent;
pub use layer::{RateLimiterLayer, RateLimiterService};
pub use limiter::{RateLimiter, RateLimiterMetrics};
