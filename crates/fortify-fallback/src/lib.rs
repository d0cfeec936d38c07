//! Fallbacks for fortify.
//!
//! A [`Fallback`] is an ordered list of handlers. Each pairs a predicate over
//! [`ResilienceError`](fortify_core::ResilienceError) with a strategy: a
//! fixed value, a value computed from the error, an async continuation, or a
//! replacement error. The first matching handler wins; unmatched errors are
//! returned unchanged.
//!
//! Kind predicates look through retry exhaustion, so a handler for
//! [`ErrorKind::Timeout`](fortify_core::ErrorKind::Timeout) also catches a
//! retry that gave up on timeouts.
//!
//! # Examples
//!
//! ```
//! use fortify_core::{ErrorKind, ResilienceError};
//! use fortify_fallback::Fallback;
//!
//! let fallback = Fallback::<&str, std::io::Error>::builder("prices")
//!     .on_kinds([ErrorKind::CallNotPermitted, ErrorKind::BulkheadFull])
//!     .value("cached prices")
//!     .on_kind(ErrorKind::Timeout)
//!     .recover(|_| "stale prices")
//!     .build();
//!
//! let open = ResilienceError::CallNotPermitted { name: "pricing".into(), state: "OPEN" };
//! assert_eq!(fallback.apply_sync(Err(open)).unwrap(), "cached prices");
//! ```

mod events;
mod fallback;
mod layer;

pub use events::FallbackEvent;
pub use fallback::{Fallback, FallbackBuilder, FallbackPredicate, FallbackStrategy, When};
pub use layer::{FallbackLayer, FallbackService};
