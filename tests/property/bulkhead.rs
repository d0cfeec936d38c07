//! Property tests for the bulkhead.
//!
//! Invariants tested:
//! - Concurrent calls never exceed max_concurrent_calls
//! - Every permit is returned once all calls finish
//! - Admitted plus rejected calls account for every request

use super::TestError;
use fortify::{Bulkhead, BulkheadConfig};
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::Runtime;

/// Tracks how many calls run at once
#[derive(Clone, Default)]
struct ConcurrencyTracker {
    current: Arc<AtomicUsize>,
    max_seen: Arc<AtomicUsize>,
}

impl ConcurrencyTracker {
    async fn work(&self, duration: Duration) -> Result<(), TestError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(duration).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    /// Property: the bulkhead never allows more concurrent calls than configured
    #[test]
    fn bulkhead_respects_max_concurrent(
        max_concurrent in 1usize..=20,
        num_requests in 1usize..=100,
        work_duration_ms in 1u64..=10,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let tracker = ConcurrencyTracker::default();
            let bulkhead = Arc::new(Bulkhead::new(
                "property",
                BulkheadConfig::builder()
                    .max_concurrent_calls(max_concurrent)
                    .max_wait_duration(Duration::from_secs(10))
                    .build(),
            ));

            let mut handles = Vec::with_capacity(num_requests);
            for _ in 0..num_requests {
                let bulkhead = Arc::clone(&bulkhead);
                let tracker = tracker.clone();
                handles.push(tokio::spawn(async move {
                    bulkhead
                        .execute(tracker.work(Duration::from_millis(work_duration_ms)))
                        .await
                }));
            }
            for handle in handles {
                prop_assert!(handle.await.unwrap().is_ok());
            }

            let observed_max = tracker.max_seen.load(Ordering::SeqCst);
            prop_assert!(
                observed_max <= max_concurrent,
                "Observed {} concurrent calls but limit was {}",
                observed_max,
                max_concurrent
            );
            prop_assert_eq!(
                bulkhead.metrics().available_concurrent_calls,
                max_concurrent
            );
            Ok(())
        })?;
    }

    /// Property: without waiting, admitted and rejected calls add up
    #[test]
    fn rejections_account_for_the_overflow(
        max_concurrent in 1usize..=10,
        num_requests in 1usize..=40,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let bulkhead = Arc::new(Bulkhead::new(
                "property",
                BulkheadConfig::builder()
                    .max_concurrent_calls(max_concurrent)
                    .build(),
            ));
            let (release, gate) = tokio::sync::watch::channel(false);

            let mut handles = Vec::with_capacity(num_requests);
            for _ in 0..num_requests {
                let bulkhead = Arc::clone(&bulkhead);
                let mut gate = gate.clone();
                handles.push(tokio::spawn(async move {
                    bulkhead
                        .execute(async move {
                            let _ = gate.wait_for(|open| *open).await;
                            Ok::<_, TestError>(())
                        })
                        .await
                }));
            }
            // single-threaded: every task reaches the bulkhead while we sleep
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = release.send(true);

            let mut admitted = 0;
            let mut rejected = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(()) => admitted += 1,
                    Err(_) => rejected += 1,
                }
            }

            prop_assert_eq!(admitted + rejected, num_requests);
            prop_assert_eq!(admitted, num_requests.min(max_concurrent));
            prop_assert_eq!(
                bulkhead.metrics().available_concurrent_calls,
                max_concurrent
            );
            Ok(())
        })?;
    }
}
