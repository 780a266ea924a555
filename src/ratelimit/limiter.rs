//! Core sliding-window limiter implementation.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, trace};

use super::backend::{Admission, Decision};
use super::record::{ActivityRecord, Admit};
use crate::error::{Result, SlidegateError};

/// Per-key sliding-window rate limiter.
///
/// Each key owns an activity record stored in a sharded [`DashMap`]. A
/// decision holds the write lock of the key's shard for the whole
/// evict/count/append sequence, so two concurrent callers on the same key can
/// never both take the last slot. Keys on different shards never contend.
///
/// Records are created lazily and are never removed by `allow` itself; see
/// [`SlidingWindowLimiter::purge_idle`] for an explicit sweep.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    /// Maximum admitted actions per window
    limit: usize,
    /// Trailing window the limit applies to
    window: Duration,
    /// Activity records indexed by key
    records: DashMap<String, ActivityRecord>,
}

impl SlidingWindowLimiter {
    /// Create a limiter, taking `limit` and `window` as given.
    ///
    /// A `limit` of 0 rejects everything. A zero `window` expires every
    /// admission before the next call, so nothing ever accumulates.
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            records: DashMap::new(),
        }
    }

    /// Create a limiter, rejecting a zero limit or a zero window.
    pub fn try_new(limit: usize, window: Duration) -> Result<Self> {
        validate_bounds(limit, window)?;
        Ok(Self::new(limit, window))
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
    ///
    /// An instant older than the newest admission already recorded for the
    /// key is treated as that admission's instant.
    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        let outcome = match self.records.get_mut(key) {
            Some(mut record) => record.try_admit(now, self.window, self.limit),
            None => {
                let mut record = self.records.entry(key.to_owned()).or_insert_with(|| {
                    debug!(key = %key, limit = self.limit, window = ?self.window, "Creating activity record");
                    ActivityRecord::new()
                });
                record.try_admit(now, self.window, self.limit)
            }
        };

        match outcome {
            Admit::Granted { count } => {
                trace!(key = %key, count, limit = self.limit, "Admitted");
                Decision::Allowed
            }
            Admit::Denied { count, retry_after } => {
                debug!(
                    key = %key,
                    count,
                    limit = self.limit,
                    retry_after = ?retry_after,
                    "Rate limit exceeded"
                );
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
        match self.records.get(key) {
            Some(record) => self
                .limit
                .saturating_sub(record.count_within(now, self.window)),
            None => self.limit,
        }
    }

    /// Drop every record whose admissions have all left the window.
    ///
    /// Returns the number of keys removed. Later decisions are unaffected:
    /// a missing record and a fully stale one admit alike.
    pub fn purge_idle(&self) -> usize {
        self.purge_idle_at(Instant::now())
    }

    /// Like [`purge_idle`](Self::purge_idle), at `now`.
    pub fn purge_idle_at(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let idle = record.is_idle(now, self.window);
            if idle {
                removed += 1;
            }
            !idle
        });
        if removed > 0 {
            debug!(removed, remaining = self.records.len(), "Purged idle keys");
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
        self.records.len()
    }

    /// Clear all records.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.records.clear();
    }
}

impl Admission for SlidingWindowLimiter {
    fn check(&self, key: &str) -> Decision {
        SlidingWindowLimiter::check(self, key)
    }

    fn remaining(&self, key: &str) -> usize {
        SlidingWindowLimiter::remaining(self, key)
    }

    fn key_count(&self) -> usize {
        SlidingWindowLimiter::key_count(self)
    }

    fn purge_idle(&self) -> usize {
        SlidingWindowLimiter::purge_idle(self)
    }
}

/// Reject configurations that can only ever deny or never accumulate.
pub(crate) fn validate_bounds(limit: usize, window: Duration) -> Result<()> {
    if limit == 0 {
        return Err(SlidegateError::Config(
            "limit must be at least 1".to_string(),
        ));
    }
    if window.is_zero() {
        return Err(SlidegateError::Config(
            "window must be longer than zero".to_string(),
        ));
    }
    Ok(())
}
