//! Event system for resilience primitives.
//!
//! Every primitive owns an [`EventPublisher`] for its own event enum.
//! Listeners can be attached at any time, including after the instance has
//! been handed out by a registry, and are invoked synchronously in the order
//! they were subscribed.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Trait for events emitted by resilience primitives.
pub trait ResilienceEvent: Send + Sync + fmt::Debug {
    /// Returns the type of event (e.g., "state_transition", "call_rejected").
    fn event_type(&self) -> &'static str;

    /// Returns when this event occurred.
    fn timestamp(&self) -> Instant;

    /// Returns the name of the instance that emitted this event.
    fn pattern_name(&self) -> &str;
}

/// Trait for listening to resilience events.
pub trait EventListener<E: ResilienceEvent>: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &E);
}

/// Type alias for shared event listeners.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// An ordered, shareable list of listeners for one event type.
///
/// Subscribing only needs `&self`, so a publisher can live inside an
/// `Arc`'d primitive.
pub struct EventPublisher<E: ResilienceEvent> {
    listeners: RwLock<Vec<BoxedEventListener<E>>>,
}

impl<E: ResilienceEvent> EventPublisher<E> {
    /// Creates a publisher with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Appends a listener.
    pub fn subscribe<L>(&self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        crate::write(&self.listeners).push(Arc::new(listener));
    }

    /// Appends a closure listener.
    pub fn subscribe_fn<F>(&self, f: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
        E: 'static,
    {
        self.subscribe(FnListener::new(f));
    }

    /// Emits an event to all listeners, in subscription order.
    ///
    /// If a listener panics, the panic is caught and the remaining listeners
    /// are still called. The listener list is snapshotted first, so a listener
    /// may itself subscribe without deadlocking.
    pub fn emit(&self, event: &E) {
        let listeners = crate::read(&self.listeners).clone();
        for listener in &listeners {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
        }
    }

    /// Removes every listener.
    pub fn clear(&self) {
        crate::write(&self.listeners).clear();
    }

    /// Returns true if there are no listeners.
    pub fn is_empty(&self) -> bool {
        crate::read(&self.listeners).is_empty()
    }

    /// Returns the number of listeners.
    pub fn len(&self) -> usize {
        crate::read(&self.listeners).len()
    }
}

impl<E: ResilienceEvent> Default for EventPublisher<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ResilienceEvent> fmt::Debug for EventPublisher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPublisher")
            .field("listeners", &self.len())
            .finish()
    }
}

/// A simple function-based event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Creates a new function-based listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: ResilienceEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
