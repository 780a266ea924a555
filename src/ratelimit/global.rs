//! Sliding-window limiter guarded by a single mutex.
//!
//! Every decision takes the same lock, so callers on different keys serialize
//! against each other. Useful as a baseline and for low key cardinality.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::backend::{Admission, Decision};
use super::record::{ActivityRecord, Admit};

/// A sliding-window limiter with one lock over the whole key map.
pub struct GlobalLockLimiter {
    limit: usize,
    window: Duration,
    records: Mutex<HashMap<String, ActivityRecord>>,
}

impl GlobalLockLimiter {
    /// Create a new limiter. No validation is performed.
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether the next action for `key` may proceed.
    pub fn allow(&self, key: &str) -> bool {
        self.check_at(key, Instant::now()).is_allowed()
    }

    /// Like [`allow`](Self::allow), but at a caller-supplied instant.
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        self.check_at(key, now).is_allowed()
    }

    /// Decide for `key` and report how long to wait on rejection.
    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    /// Decide for `key` at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        let outcome = {
            let mut records = self.records.lock();
            records
                .entry(key.to_owned())
                .or_insert_with(|| {
                    debug!(key = %key, limit = self.limit, "Creating activity record");
                    ActivityRecord::new()
                })
                .try_admit(now, self.window, self.limit)
        };

        match outcome {
            Admit::Granted { count } => {
                trace!(key = %key, count, limit = self.limit, "Admitted");
                Decision::Allowed
            }
            Admit::Denied { count, retry_after } => {
                debug!(key = %key, count, limit = self.limit, "Rate limit exceeded");
                Decision::Rejected { retry_after }
            }
        }
    }

    /// Slots left for `key` right now. The record is not touched.
    pub fn remaining(&self, key: &str) -> usize {
        self.remaining_at(key, Instant::now())
    }

    /// Slots left for `key` at `now`.
    pub fn remaining_at(&self, key: &str, now: Instant) -> usize {
        let records = self.records.lock();
        records
            .get(key)
            .map(|record| self.limit.saturating_sub(record.count_within(now, self.window)))
            .unwrap_or(self.limit)
    }

    /// Drop every record whose admissions have all left the window.
    pub fn purge_idle(&self) -> usize {
        self.purge_idle_at(Instant::now())
    }

    /// Like [`purge_idle`](Self::purge_idle), at `now`.
    pub fn purge_idle_at(&self, now: Instant) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| !record.is_idle(now, self.window));
        let removed = before - records.len();
        if removed > 0 {
            debug!(removed, remaining = records.len(), "Purged idle keys");
        }
        removed
    }

    /// Get the configured limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Get the configured window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Get the number of keys with a record.
    pub fn key_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Clear all records.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Admission for GlobalLockLimiter {
    fn check(&self, key: &str) -> Decision {
        GlobalLockLimiter::check(self, key)
    }

    fn remaining(&self, key: &str) -> usize {
        GlobalLockLimiter::remaining(self, key)
    }

    fn key_count(&self) -> usize {
        GlobalLockLimiter::key_count(self)
    }

    fn purge_idle(&self) -> usize {
        GlobalLockLimiter::purge_idle(self)
    }
}
