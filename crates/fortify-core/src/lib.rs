//! Core infrastructure for fortify.
//!
//! This crate provides the pieces shared by every resilience primitive:
//! - [`ResilienceError`], the error type every decorated call resolves to
//! - An event system for observability ([`EventPublisher`], [`EventListener`])
//! - [`Registry`], a named-instance store with lifecycle events
//! - [`promise`], a runtime-independent completion handle used for
//!   thread-pool submission and synchronous deadline waits

pub mod error;
pub mod events;
#[cfg(feature = "layer")]
pub mod layer;
pub mod promise;
pub mod registry;

pub use error::{find_cause, ErrorKind, ErrorPredicate, ResilienceError};
pub use events::{BoxedEventListener, EventListener, EventPublisher, FnListener, ResilienceEvent};
#[cfg(feature = "layer")]
pub use layer::{ResilienceErrorFuture, ResilienceErrorLayer, ResilienceErrorService};
pub use promise::{Abandoned, Completion, Pending, Promise, WaitError};
pub use registry::{Registrable, Registry, RegistryEvent};

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Locks a mutex, recovering the guard if a previous holder panicked.
///
/// None of the state guarded in this workspace can be left logically torn by
/// a panic (listener panics are caught before they reach a lock holder), so
/// poisoning is not treated as fatal.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read-locks an `RwLock`, recovering from poisoning.
pub fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write-locks an `RwLock`, recovering from poisoning.
pub fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
