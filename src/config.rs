//! Configuration management for slidegate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, SlidegateError};
use crate::ratelimit::{validate_bounds, Admission, GlobalLockLimiter, SlidingWindowLimiter};

/// How the key map is synchronized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locking {
    /// Per-shard locks; callers on different shards never contend.
    #[default]
    Sharded,
    /// One mutex over every key.
    Global,
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum admitted actions per window
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Map synchronization strategy
    #[serde(default)]
    pub locking: Locking,

    /// Reject a zero limit or zero window when building
    #[serde(default)]
    pub strict: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_ms: default_window_ms(),
            locking: Locking::default(),
            strict: false,
        }
    }
}

fn default_limit() -> usize {
    100
}

fn default_window_ms() -> u64 {
    1000
}

impl LimiterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| SlidegateError::Config(format!("Failed to parse limiter config: {}", e)))
    }

    /// The window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Reject a zero limit or a zero window.
    pub fn validate(&self) -> Result<()> {
        validate_bounds(self.limit, self.window())
    }

    /// Build the configured limiter.
    ///
    /// Bounds are only checked when `strict` is set.
    pub fn build(&self) -> Result<Box<dyn Admission>> {
        if self.strict {
            self.validate()?;
        }

        info!(
            limit = self.limit,
            window_ms = self.window_ms,
            locking = ?self.locking,
            "Building limiter"
        );

        let limiter: Box<dyn Admission> = match self.locking {
            Locking::Sharded => Box::new(SlidingWindowLimiter::new(self.limit, self.window())),
            Locking::Global => Box::new(GlobalLockLimiter::new(self.limit, self.window())),
        };
        Ok(limiter)
    }
}
