//! The contract every target environment satisfies.
//!
//! A [`Platform`] turns resolved launch options into a running
//! [`ApplicationProcess`]. Everything else about launching (profiles, meta
//! classes, listeners, logging) is shared and lives in the launcher.

use async_trait::async_trait;
use harness_core::options::OptionsByType;
use std::fmt::Debug;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LaunchError, ProcessError};

/// Exit value reported for a process that ended without an exit code, such as
/// one terminated by a signal.
pub const SIGNALLED_EXIT_VALUE: i32 = -1;

/// A target environment that can run applications.
#[async_trait]
pub trait Platform: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Address at which applications on this platform are reachable.
    fn address(&self) -> IpAddr;

    /// Options every launch on this platform starts from. Caller options
    /// override them.
    fn options(&self) -> OptionsByType {
        OptionsByType::empty()
    }

    /// Start the process described by `options`.
    async fn realize(&self, options: &OptionsByType)
        -> Result<Arc<dyn ApplicationProcess>, LaunchError>;
}

/// A process started by a [`Platform`].
#[async_trait]
pub trait ApplicationProcess: Send + Sync + Debug {
    /// Platform specific process identifier, if there is one.
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit, returning its exit value.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::TimedOut`] when it is still running after
    /// `timeout`.
    async fn wait_for(&self, timeout: Duration) -> Result<i32, ProcessError>;

    /// The exit value once the process has exited.
    fn exit_value(&self) -> Option<i32>;

    /// Forcibly terminate the process. Closing an exited process succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] when termination could not be confirmed.
    async fn close(&self) -> Result<(), ProcessError>;
}
