//! Admission trait for abstracting the sharded and coarse-lock limiters.

use std::time::Duration;

/// Result of a single admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The action may proceed and now counts against the window.
    Allowed,
    /// The key is at its limit. Nothing was recorded.
    Rejected {
        /// Time until the oldest counted action leaves the window, or `None`
        /// when the limit is zero and no retry can ever succeed.
        retry_after: Option<Duration>,
    },
}

impl Decision {
    /// Whether the action was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Trait for limiter implementations.
///
/// This trait abstracts over both the sharded `SlidingWindowLimiter` and the
/// `GlobalLockLimiter` so a host can hold either behind one handle.
pub trait Admission: Send + Sync {
    /// Decide whether the next action for `key` may proceed.
    fn check(&self, key: &str) -> Decision;

    /// Shorthand for `check(key).is_allowed()`.
    fn allow(&self, key: &str) -> bool {
        self.check(key).is_allowed()
    }

    /// Slots left for `key` right now, without recording anything.
    fn remaining(&self, key: &str) -> usize;

    /// Number of keys with a record.
    fn key_count(&self) -> usize;

    /// Drop records whose admissions have all left the window.
    ///
    /// Returns the number of keys removed.
    fn purge_idle(&self) -> usize;
}
