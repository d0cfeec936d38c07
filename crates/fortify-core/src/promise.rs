//! One-shot completion handles that work without an async runtime.
//!
//! [`channel`] returns a [`Promise`] for the producing side and a
//! [`Completion`] for the consumer. The consumer can block (`wait`,
//! `wait_until`) or `.await` it, which is what lets synchronous and
//! asynchronous pipelines share the thread-pool bulkhead and the time
//! limiter. Cancellation is cooperative: [`Completion::cancel`] only sets a
//! flag the producer can check with [`Promise::is_cancelled`].

use futures::task::AtomicWaker;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// The producing side was dropped without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("promise dropped before completing")]
pub struct Abandoned;

/// Errors from a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// The deadline passed before a value arrived.
    #[error("timed out waiting for completion")]
    TimedOut,
    /// The producing side was dropped without a value.
    #[error("promise dropped before completing")]
    Abandoned,
}

impl From<Abandoned> for WaitError {
    fn from(_: Abandoned) -> Self {
        WaitError::Abandoned
    }
}

/// Something that settles later and can be waited on with a deadline.
///
/// Implemented by [`Completion`] and by thread-pool bulkhead tasks, so a time
/// limiter can bound either without caring who produces the value.
pub trait Pending {
    /// The settled value.
    type Output;

    /// Blocks until a value arrives or `deadline` passes.
    fn wait_until(&mut self, deadline: Instant) -> Result<Self::Output, WaitError>;

    /// Signals the producer that the value is no longer wanted.
    fn cancel(&self);

    /// Stops waiting without cancelling; the producer runs to completion.
    fn detach(self)
    where
        Self: Sized;
}

enum Slot<T> {
    Empty,
    Ready(T),
    Taken,
    Abandoned,
}

impl<T> Slot<T> {
    fn take(&mut self) -> Option<Result<T, Abandoned>> {
        match std::mem::replace(self, Slot::Taken) {
            Slot::Empty => {
                *self = Slot::Empty;
                None
            }
            Slot::Ready(value) => Some(Ok(value)),
            Slot::Taken | Slot::Abandoned => Some(Err(Abandoned)),
        }
    }
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
    waker: AtomicWaker,
    cancelled: AtomicBool,
}

impl<T> Shared<T> {
    fn settle(&self, value: Slot<T>) {
        {
            let mut slot = crate::lock(&self.slot);
            if matches!(*slot, Slot::Empty) {
                *slot = value;
            }
        }
        self.ready.notify_all();
        self.waker.wake();
    }
}

/// Creates a connected promise/completion pair.
pub fn channel<T>() -> (Promise<T>, Completion<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Empty),
        ready: Condvar::new(),
        waker: AtomicWaker::new(),
        cancelled: AtomicBool::new(false),
    });
    (
        Promise {
            shared: Some(Arc::clone(&shared)),
        },
        Completion {
            shared,
            cancel_on_drop: true,
        },
    )
}

/// The producing half. Dropping it without completing abandons the value.
pub struct Promise<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Promise<T> {
    /// Delivers the value and wakes any waiter.
    pub fn complete(mut self, value: T) {
        if let Some(shared) = self.shared.take() {
            shared.settle(Slot::Ready(value));
        }
    }

    /// Returns `true` once the consumer cancelled or was dropped.
    pub fn is_cancelled(&self) -> bool {
        self.shared
            .as_ref()
            .map_or(true, |shared| shared.cancelled.load(Ordering::Acquire))
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.settle(Slot::Abandoned);
        }
    }
}

/// The consuming half.
///
/// Resolves to `Err(Abandoned)` when awaited if the promise was dropped.
/// Dropping a completion cancels it unless it was [detached](Self::detach).
pub struct Completion<T> {
    shared: Arc<Shared<T>>,
    cancel_on_drop: bool,
}

impl<T> Completion<T> {
    /// Returns `true` if a value (or abandonment) is ready to be taken.
    pub fn is_settled(&self) -> bool {
        !matches!(*crate::lock(&self.shared.slot), Slot::Empty)
    }

    /// Marks the value as no longer wanted.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
    }

    /// Drops the completion without cancelling; the producer still runs.
    pub fn detach(mut self) {
        self.cancel_on_drop = false;
    }

    /// Returns `true` if [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Blocks the calling thread until the value arrives.
    pub fn wait(self) -> Result<T, Abandoned> {
        let mut slot = crate::lock(&self.shared.slot);
        loop {
            if let Some(result) = slot.take() {
                return result;
            }
            slot = self
                .shared
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until the value arrives or `deadline` passes.
    pub fn wait_until(&mut self, deadline: Instant) -> Result<T, WaitError> {
        let mut slot = crate::lock(&self.shared.slot);
        loop {
            if let Some(result) = slot.take() {
                return result.map_err(WaitError::from);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::TimedOut);
            }
            slot = self
                .shared
                .ready
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Blocks for at most `timeout`.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<T, WaitError> {
        self.wait_until(Instant::now() + timeout)
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if self.cancel_on_drop {
            self.cancel();
        }
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T, Abandoned>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.shared.waker.register(cx.waker());
        let mut slot = crate::lock(&self.shared.slot);
        match slot.take() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}

impl<T> Pending for Completion<T> {
    type Output = T;

    fn wait_until(&mut self, deadline: Instant) -> Result<T, WaitError> {
        Completion::wait_until(self, deadline)
    }

    fn cancel(&self) {
        Completion::cancel(self)
    }

    fn detach(self) {
        Completion::detach(self)
    }
}
