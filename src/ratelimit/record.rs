//! Per-key activity record.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Timestamps of admitted actions that may still be inside the window.
///
/// Timestamps are kept in non-decreasing order, so stale entries always form
/// a contiguous prefix and eviction only ever pops from the front.
#[derive(Debug, Default)]
pub(crate) struct ActivityRecord {
    admitted: VecDeque<Instant>,
}

impl ActivityRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every timestamp with `now - t >= window`.
    ///
    /// Returns the number of timestamps removed.
    pub fn evict(&mut self, now: Instant, window: Duration) -> usize {
        let before = self.admitted.len();
        while let Some(&oldest) = self.admitted.front() {
            if is_stale(oldest, now, window) {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
        before - self.admitted.len()
    }

    /// Evict, then admit `now` if fewer than `limit` timestamps remain.
    ///
    /// A rejected attempt leaves the record as eviction left it. With a zero
    /// `limit` no slot can ever open, so the denial carries no retry hint.
    pub fn try_admit(&mut self, now: Instant, window: Duration, limit: usize) -> Admit {
        let now = self.clamp(now);
        self.evict(now, window);

        let count = self.admitted.len();
        if count < limit {
            self.admitted.push_back(now);
            Admit::Granted { count: count + 1 }
        } else {
            Admit::Denied {
                count,
                retry_after: (limit > 0).then(|| self.retry_after(now, window)),
            }
        }
    }

    /// Number of timestamps still inside the window at `now`, without evicting.
    pub fn count_within(&self, now: Instant, window: Duration) -> usize {
        self.admitted
            .iter()
            .filter(|&&t| !is_stale(t, now, window))
            .count()
    }

    /// Time until the oldest counted timestamp leaves the window.
    pub fn retry_after(&self, now: Instant, window: Duration) -> Duration {
        self.admitted
            .iter()
            .find(|&&t| !is_stale(t, now, window))
            .map(|&oldest| window.saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or(Duration::ZERO)
    }

    /// Whether every recorded timestamp is stale at `now`.
    pub fn is_idle(&self, now: Instant, window: Duration) -> bool {
        self.admitted
            .back()
            .map_or(true, |&newest| is_stale(newest, now, window))
    }

    // Keep the record sorted if a caller hands us an instant from the past.
    fn clamp(&self, now: Instant) -> Instant {
        match self.admitted.back() {
            Some(&newest) if newest > now => newest,
            _ => now,
        }
    }
}

/// Outcome of a single [`ActivityRecord::try_admit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admit {
    /// The action was recorded; `count` includes it.
    Granted { count: usize },
    /// The record was at its limit. `retry_after` is `None` when no slot
    /// will ever open.
    Denied {
        count: usize,
        retry_after: Option<Duration>,
    },
}

fn is_stale(t: Instant, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(t) >= window
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_admits_up_to_limit() {
        let t0 = Instant::now();
        let mut record = ActivityRecord::new();

        assert_eq!(record.try_admit(t0, WINDOW, 2), Admit::Granted { count: 1 });
        assert_eq!(record.try_admit(t0, WINDOW, 2), Admit::Granted { count: 2 });
        assert!(matches!(
            record.try_admit(t0, WINDOW, 2),
            Admit::Denied { count: 2, .. }
        ));
        assert_eq!(record.admitted.len(), 2);
    }

    #[test]
    fn test_zero_limit_never_records() {
        let t0 = Instant::now();
        let mut record = ActivityRecord::new();

        for i in 0..5 {
            let outcome = record.try_admit(t0 + ms(i * 10), WINDOW, 0);
            assert_eq!(
                outcome,
                Admit::Denied {
                    count: 0,
                    retry_after: None
                }
            );
        }
        assert!(record.admitted.is_empty());
    }

    #[test]
    fn test_boundary_timestamp_is_evicted() {
        let t0 = Instant::now();
        let mut record = ActivityRecord::new();
        record.try_admit(t0, WINDOW, 1);

        // 99ms old is still counted
        assert_eq!(record.evict(t0 + ms(99), WINDOW), 0);
        // exactly one window old is gone
        assert_eq!(record.evict(t0 + WINDOW, WINDOW), 1);
        assert!(record.admitted.is_empty());
    }

    #[test]
    fn test_evicts_contiguous_prefix_only() {
        let t0 = Instant::now();
        let mut record = ActivityRecord::new();
        record.try_admit(t0, WINDOW, 10);
        record.try_admit(t0 + ms(20), WINDOW, 10);
        record.try_admit(t0 + ms(60), WINDOW, 10);

        assert_eq!(record.evict(t0 + ms(110), WINDOW), 1);
        assert_eq!(record.admitted.len(), 2);
        assert_eq!(record.evict(t0 + ms(125), WINDOW), 1);
        assert_eq!(record.admitted.len(), 1);
    }

    #[test]
    fn test_rejection_reports_retry_after() {
        let t0 = Instant::now();
        let mut record = ActivityRecord::new();
        record.try_admit(t0, WINDOW, 1);

        match record.try_admit(t0 + ms(30), WINDOW, 1) {
            Admit::Denied { retry_after, .. } => assert_eq!(retry_after, Some(ms(70))),
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_window_never_accumulates() {
        let t0 = Instant::now();
        let mut record = ActivityRecord::new();

        assert!(matches!(
            record.try_admit(t0, Duration::ZERO, 1),
            Admit::Granted { .. }
        ));
        assert!(matches!(
            record.try_admit(t0, Duration::ZERO, 1),
            Admit::Granted { count: 1 }
        ));
        assert_eq!(record.admitted.len(), 1);
    }

    #[test]
    fn test_count_within_does_not_mutate() {
        let t0 = Instant::now();
        let mut record = ActivityRecord::new();
        record.try_admit(t0, WINDOW, 5);
        record.try_admit(t0 + ms(50), WINDOW, 5);

        assert_eq!(record.count_within(t0 + ms(120), WINDOW), 1);
        assert_eq!(record.admitted.len(), 2);
    }

    #[test]
    fn test_past_instant_is_clamped() {
        let t0 = Instant::now();
        let mut record = ActivityRecord::new();
        record.try_admit(t0 + ms(50), WINDOW, 5);
        record.try_admit(t0, WINDOW, 5);

        // both entries sit at t0+50ms, so both expire together
        assert_eq!(record.evict(t0 + ms(150), WINDOW), 2);
    }

    #[test]
    fn test_is_idle() {
        let t0 = Instant::now();
        let mut record = ActivityRecord::new();
        assert!(record.is_idle(t0, WINDOW));

        record.try_admit(t0, WINDOW, 1);
        assert!(!record.is_idle(t0 + ms(10), WINDOW));
        assert!(record.is_idle(t0 + WINDOW, WINDOW));
    }
}
