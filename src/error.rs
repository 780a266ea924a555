//! Error types for slidegate.

use thiserror::Error;

/// Main error type for slidegate operations.
///
/// Admission decisions never fail; these errors come from configuration
/// loading and the validating constructor.
#[derive(Error, Debug)]
pub enum SlidegateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for slidegate operations.
pub type Result<T> = std::result::Result<T, SlidegateError>;
