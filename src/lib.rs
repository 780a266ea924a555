//! Slidegate - per-key sliding-window rate limiting
//!
//! This crate decides whether the next action for a key may proceed, given a
//! maximum number of admitted actions within a trailing time window. State is
//! held in process; each key's record is evicted lazily on access.

pub mod config;
pub mod error;
pub mod ratelimit;

pub use config::{LimiterConfig, Locking};
pub use error::{Result, SlidegateError};
pub use ratelimit::{Admission, Decision, GlobalLockLimiter, SlidingWindowLimiter};
