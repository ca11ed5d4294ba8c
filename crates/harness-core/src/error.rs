//! Common error types for harness components.

use thiserror::Error;

/// Boxed error used as the optional cause of higher-level failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Common errors that can occur across harness components
#[derive(Error, Debug)]
pub enum HarnessError {
    /// An option was constructed with values it cannot represent
    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

/// Result type alias using `HarnessError`
pub type Result<T> = std::result::Result<T, HarnessError>;
