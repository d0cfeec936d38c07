//! Composition tests.
//!
//! - blocking.rs: decorated suppliers run on the calling thread
//! - async_calls.rs: decorated futures and suppliers driven from async code
//! - tower_stack.rs: the same primitives as tower layers

mod blocking;
mod tower_stack;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("upstream unavailable")]
pub struct Unavailable;

/// Counts invocations of a protected operation.
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn hit(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
