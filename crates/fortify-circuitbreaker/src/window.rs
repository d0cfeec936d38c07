//! Count-based sliding window of call outcomes.

use std::collections::VecDeque;
use std::time::Duration;

/// Whether a recorded call succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The call succeeded, or failed with an error that is not recorded.
    Success,
    /// The call failed.
    Failure,
}

/// One recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallRecord {
    /// Success or failure.
    pub outcome: Outcome,
    /// Whether the call reached the slow call duration threshold.
    pub slow: bool,
    /// How long the call took.
    pub duration: Duration,
}

/// Aggregates over the current window contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Snapshot {
    /// Number of buffered outcomes.
    pub total_calls: usize,
    /// Failed outcomes.
    pub failed_calls: usize,
    /// Slow outcomes, successful or not.
    pub slow_calls: usize,
    /// Outcomes that were both slow and failed.
    pub slow_failed_calls: usize,
    /// Sum of all durations.
    pub total_duration: Duration,
}

impl Snapshot {
    /// Successful outcomes.
    pub fn successful_calls(&self) -> usize {
        self.total_calls - self.failed_calls
    }

    /// Failed share of the buffered outcomes, `0.0` when empty.
    pub fn failure_rate(&self) -> f64 {
        ratio(self.failed_calls, self.total_calls)
    }

    /// Slow share of the buffered outcomes, `0.0` when empty.
    pub fn slow_call_rate(&self) -> f64 {
        ratio(self.slow_calls, self.total_calls)
    }

    /// Mean duration, zero when empty.
    pub fn average_duration(&self) -> Duration {
        if self.total_calls == 0 {
            return Duration::ZERO;
        }
        self.total_duration / u32::try_from(self.total_calls).unwrap_or(u32::MAX)
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Ring buffer of the most recent `capacity` outcomes.
///
/// Inserting into a full window evicts the oldest record. Aggregates are
/// maintained incrementally so recording and snapshotting are O(1).
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    capacity: usize,
    records: VecDeque<CallRecord>,
    totals: Snapshot,
}

impl SlidingWindow {
    /// Creates an empty window.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "sliding window capacity must be greater than 0");
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
            totals: Snapshot::default(),
        }
    }

    /// Records an outcome and returns the updated aggregates.
    pub fn record(&mut self, record: CallRecord) -> Snapshot {
        if self.records.len() == self.capacity {
            if let Some(evicted) = self.records.pop_front() {
                self.apply(&evicted, false);
            }
        }
        self.apply(&record, true);
        self.records.push_back(record);
        self.totals
    }

    fn apply(&mut self, record: &CallRecord, add: bool) {
        let failed = record.outcome == Outcome::Failure;
        let t = &mut self.totals;
        if add {
            t.total_calls += 1;
            t.failed_calls += usize::from(failed);
            t.slow_calls += usize::from(record.slow);
            t.slow_failed_calls += usize::from(record.slow && failed);
            t.total_duration += record.duration;
        } else {
            t.total_calls -= 1;
            t.failed_calls -= usize::from(failed);
            t.slow_calls -= usize::from(record.slow);
            t.slow_failed_calls -= usize::from(record.slow && failed);
            t.total_duration = t.total_duration.saturating_sub(record.duration);
        }
    }

    /// Current aggregates.
    pub fn snapshot(&self) -> Snapshot {
        self.totals
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.records.clear();
        self.totals = Snapshot::default();
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of buffered records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffered records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &CallRecord> {
        self.records.iter()
    }
}
