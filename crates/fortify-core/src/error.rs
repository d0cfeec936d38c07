//! The error type every decorated call resolves to.
//!
//! [`ResilienceError<E>`] keeps the application error `E` intact and adds one
//! variant per way the resilience machinery itself can end a call. Each
//! primitive crate provides a `From` conversion from its own error struct, so
//! `?` composes without any hand-written glue:
//!
//! ```
//! use fortify_core::{ErrorKind, ResilienceError};
//!
//! #[derive(Debug)]
//! struct RemoteDown;
//!
//! impl std::fmt::Display for RemoteDown {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "remote down")
//!     }
//! }
//!
//! impl std::error::Error for RemoteDown {}
//!
//! let err: ResilienceError<RemoteDown> = ResilienceError::RequestNotPermitted {
//!     name: "backendA".into(),
//! };
//! assert_eq!(err.kind(), ErrorKind::RequestNotPermitted);
//! assert!(err.is_admission_rejection());
//! assert_eq!(err.suggested_http_status(), 429);
//! ```

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Distinguishes the ways a decorated call can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The protected operation itself failed.
    Application,
    /// A circuit breaker rejected the call.
    CallNotPermitted,
    /// A bulkhead had no free permit or worker.
    BulkheadFull,
    /// A rate limiter had no permit for the current period.
    RequestNotPermitted,
    /// The call exceeded its deadline.
    Timeout,
    /// Retry gave up; the last failure is attached.
    RetryExhausted,
}

impl ErrorKind {
    /// Returns a stable, lowercase name for logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Application => "application",
            ErrorKind::CallNotPermitted => "call_not_permitted",
            ErrorKind::BulkheadFull => "bulkhead_full",
            ErrorKind::RequestNotPermitted => "request_not_permitted",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RetryExhausted => "retry_exhausted",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed decorated call.
///
/// # Type Parameters
///
/// - `E`: The error type of the protected operation
#[derive(Debug, Clone, PartialEq)]
pub enum ResilienceError<E> {
    /// The protected operation returned an error.
    Application(E),

    /// A circuit breaker is open, forced open, or out of half-open trial calls.
    CallNotPermitted {
        /// Circuit breaker name
        name: String,
        /// State the breaker was in when it rejected the call
        state: &'static str,
    },

    /// A bulkhead rejected the call.
    BulkheadFull {
        /// Bulkhead name
        name: String,
        /// Configured concurrency limit
        max_concurrent_calls: usize,
    },

    /// A rate limiter rejected the call.
    RequestNotPermitted {
        /// Rate limiter name
        name: String,
    },

    /// A time limiter deadline expired.
    Timeout {
        /// Time limiter name
        name: String,
        /// Configured deadline
        timeout: Duration,
    },

    /// Retry stopped after the configured number of attempts.
    RetryExhausted {
        /// Retry name
        name: String,
        /// Number of attempts made
        attempts: usize,
        /// The failure of the final attempt
        last: Box<ResilienceError<E>>,
    },
}

impl<E> ResilienceError<E> {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResilienceError::Application(_) => ErrorKind::Application,
            ResilienceError::CallNotPermitted { .. } => ErrorKind::CallNotPermitted,
            ResilienceError::BulkheadFull { .. } => ErrorKind::BulkheadFull,
            ResilienceError::RequestNotPermitted { .. } => ErrorKind::RequestNotPermitted,
            ResilienceError::Timeout { .. } => ErrorKind::Timeout,
            ResilienceError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
        }
    }

    /// Returns `true` for circuit-open, bulkhead-full and rate-limited errors.
    ///
    /// Admission rejections never reached the protected operation and are
    /// never retried automatically.
    pub fn is_admission_rejection(&self) -> bool {
        matches!(
            self,
            ResilienceError::CallNotPermitted { .. }
                | ResilienceError::BulkheadFull { .. }
                | ResilienceError::RequestNotPermitted { .. }
        )
    }

    /// Returns `true` if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResilienceError::Timeout { .. })
    }

    /// Returns `true` if this is an application error.
    pub fn is_application(&self) -> bool {
        matches!(self, ResilienceError::Application(_))
    }

    /// Returns `true` if retry gave up.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, ResilienceError::RetryExhausted { .. })
    }

    /// Returns the innermost error, looking through retry exhaustion.
    pub fn root_cause(&self) -> &ResilienceError<E> {
        let mut current = self;
        while let ResilienceError::RetryExhausted { last, .. } = current {
            current = last;
        }
        current
    }

    /// Consumes the error and returns the innermost one.
    pub fn into_root_cause(self) -> ResilienceError<E> {
        let mut current = self;
        while let ResilienceError::RetryExhausted { last, .. } = current {
            current = *last;
        }
        current
    }

    /// Returns a reference to the application error, if the root cause is one.
    pub fn as_application(&self) -> Option<&E> {
        match self.root_cause() {
            ResilienceError::Application(e) => Some(e),
            _ => None,
        }
    }

    /// Extracts the application error, if the root cause is one.
    pub fn application_error(self) -> Option<E> {
        match self.into_root_cause() {
            ResilienceError::Application(e) => Some(e),
            _ => None,
        }
    }

    /// Suggests an HTTP status code for this error.
    ///
    /// Admission rejections map to 429, timeouts to 504, application errors
    /// to 500. Retry exhaustion maps to the status of its last failure.
    pub fn suggested_http_status(&self) -> u16 {
        match self.root_cause() {
            ResilienceError::CallNotPermitted { .. }
            | ResilienceError::BulkheadFull { .. }
            | ResilienceError::RequestNotPermitted { .. } => 429,
            ResilienceError::Timeout { .. } => 504,
            _ => 500,
        }
    }

    /// Maps the application error using a function.
    ///
    /// # Examples
    ///
    /// ```
    /// use fortify_core::ResilienceError;
    ///
    /// let err: ResilienceError<String> = ResilienceError::Application("error".to_string());
    /// let mapped: ResilienceError<usize> = err.map_application(|s| s.len());
    /// assert_eq!(mapped.application_error(), Some(5));
    /// ```
    pub fn map_application<F, T>(self, f: F) -> ResilienceError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            ResilienceError::Application(e) => ResilienceError::Application(f(e)),
            ResilienceError::CallNotPermitted { name, state } => {
                ResilienceError::CallNotPermitted { name, state }
            }
            ResilienceError::BulkheadFull {
                name,
                max_concurrent_calls,
            } => ResilienceError::BulkheadFull {
                name,
                max_concurrent_calls,
            },
            ResilienceError::RequestNotPermitted { name } => {
                ResilienceError::RequestNotPermitted { name }
            }
            ResilienceError::Timeout { name, timeout } => ResilienceError::Timeout { name, timeout },
            ResilienceError::RetryExhausted {
                name,
                attempts,
                last,
            } => ResilienceError::RetryExhausted {
                name,
                attempts,
                last: Box::new(last.map_application(f)),
            },
        }
    }
}

impl<E> fmt::Display for ResilienceError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResilienceError::Application(e) => write!(f, "{}", e),
            ResilienceError::CallNotPermitted { name, state } => {
                write!(f, "CircuitBreaker '{}' is {} and does not permit further calls", name, state)
            }
            ResilienceError::BulkheadFull {
                name,
                max_concurrent_calls,
            } => write!(
                f,
                "Bulkhead '{}' is full and does not permit further calls (max {})",
                name, max_concurrent_calls
            ),
            ResilienceError::RequestNotPermitted { name } => {
                write!(f, "RateLimiter '{}' does not permit further calls", name)
            }
            ResilienceError::Timeout { name, timeout } => {
                write!(f, "TimeLimiter '{}' recorded a timeout after {:?}", name, timeout)
            }
            ResilienceError::RetryExhausted {
                name,
                attempts,
                last,
            } => write!(
                f,
                "Retry '{}' exhausted after {} attempts: {}",
                name, attempts, last
            ),
        }
    }
}

impl<E> Error for ResilienceError<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ResilienceError::Application(e) => Some(e),
            ResilienceError::RetryExhausted { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}

/// Predicate over an application error, shared by configurations that
/// classify errors.
pub type ErrorPredicate = Arc<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

/// Searches `err` and its `source()` chain for an error of type `X`.
///
/// Used by circuit breaker, retry and fallback predicates that match on
/// application error types.
pub fn find_cause<'a, X>(err: &'a (dyn Error + 'static)) -> Option<&'a X>
where
    X: Error + 'static,
{
    let mut current: Option<&'a (dyn Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<X>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}
