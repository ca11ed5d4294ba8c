//! Core building blocks for launching and observing applications under test.
//!
//! This crate holds the pieces every platform and assertion builds on:
//! typed option registries, feature registries for long-lived handles,
//! deferred values with retry policies, and cooperative interruption.

#![warn(clippy::pedantic)]

/// Module for common error types
pub mod error;

/// Module for environment-driven configuration
pub mod config;

/// Module for tracing bootstrap
pub mod observability;

/// Module for the typed option registry
pub mod options;

/// Module for runtime capability attachment
pub mod extensible;

/// Module for cooperative interruption
pub mod interrupt;

/// Module for retry interval sequences
pub mod retry;

/// Module for timeout and delay options
pub mod timing;

/// Module for deferred values and the retry loop that resolves them
pub mod deferred;

pub use deferred::{Deferred, DeferredError, DeferredExt};
pub use error::{HarnessError, Result};
pub use extensible::{Extensible, ExtensibleError, Feature, Features};
pub use interrupt::{Interrupt, Interruptible, Interrupted};
pub use options::{Collectable, Collector, Opt, OptionsByType};
pub use retry::RetryFrequency;
pub use timing::{delayed_by, within, InitialDelay, MaximumRetryDelay, Timeout};
