//! Assertions over values that become true eventually.
//!
//! - [`eventually`] polls a deferred value until a matcher accepts it.
//! - [`repetitively`] requires the matcher to hold on every poll for the
//!   whole time budget.
//! - [`concurrently`] runs the repetitive check on a background task and can
//!   interrupt the caller as soon as it fails.

#![warn(clippy::pedantic)]

pub mod concurrently;
pub mod error;
pub mod eventually;
pub mod matchers;
pub mod repetitively;

pub use concurrently::{ConcurrentAssertion, FailFast};
pub use error::AssertionError;
pub use matchers::Matcher;
