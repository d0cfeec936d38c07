//! Bulkheads for fortify.
//!
//! Two flavours isolate a dependency so it cannot consume every resource:
//!
//! - [`Bulkhead`] caps concurrent calls with a permit counter. Calls run on
//!   the caller's thread or task and may wait up to `max_wait_duration` for a
//!   permit.
//! - [`ThreadPoolBulkhead`] runs operations on a bounded pool of worker
//!   threads fed by a bounded queue, and rejects when both are full.
//!
//! ## Usage
//!
//! ```rust
//! use fortify_bulkhead::{Bulkhead, BulkheadConfig};
//!
//! let bulkhead = Bulkhead::new(
//!     "inventory",
//!     BulkheadConfig::builder().max_concurrent_calls(1).build(),
//! );
//!
//! bulkhead.try_acquire_permission().unwrap();
//! assert!(bulkhead.try_acquire_permission().is_err());
//! bulkhead.release_permission();
//!
//! let value = bulkhead.execute_sync(|| Ok::<_, std::io::Error>(7)).unwrap();
//! assert_eq!(value, 7);
//! ```
//!
//! ```rust
//! use fortify_bulkhead::{ThreadPoolBulkhead, ThreadPoolBulkheadConfig};
//!
//! let pool = ThreadPoolBulkhead::new(
//!     "reports",
//!     ThreadPoolBulkheadConfig::builder()
//!         .core_thread_pool_size(1)
//!         .max_thread_pool_size(2)
//!         .queue_capacity(4)
//!         .build(),
//! );
//!
//! let task = pool.submit(|| 6 * 7).unwrap();
//! assert_eq!(task.wait().unwrap(), 42);
//! pool.shutdown();
//! ```

mod config;
mod error;
mod events;
mod layer;
mod semaphore;
mod thread_pool;

pub use config::{
    BulkheadConfig, BulkheadConfigBuilder, ThreadPoolBulkheadConfig,
    ThreadPoolBulkheadConfigBuilder,
};
pub use error::BulkheadFullError;
pub use events::BulkheadEvent;
pub use layer::{BulkheadLayer, BulkheadService};
pub use semaphore::{Bulkhead, BulkheadMetrics};
pub use thread_pool::{BulkheadTask, ThreadPoolBulkhead, ThreadPoolBulkheadMetrics};
