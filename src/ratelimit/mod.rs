//! Rate limiting logic and state management.
//!
//! Per-key records are owned by the limiters and are not reachable from
//! outside the crate:
//!
//! ```compile_fail
//! use slidegate::ratelimit::ActivityRecord;
//! ```

mod backend;
mod global;
mod limiter;
mod record;

pub use backend::{Admission, Decision};
pub use global::GlobalLockLimiter;
pub(crate) use limiter::validate_bounds;
pub use limiter::SlidingWindowLimiter;
