//! Bulkhead tests.
//!
//! - permits.rs: semaphore admission, waiting and permit return
//! - thread_pool.rs: worker pool admission, queueing and shutdown

mod thread_pool;
