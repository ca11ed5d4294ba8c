//! Cooperative interruption.
//!
//! An [`Interrupt`] stands for the interruption status of one caller. Waits
//! made through it abort as soon as it is interrupted, and retry loops that
//! are given one through the [`Interruptible`] option stop between attempts.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::options::Opt;

/// The wait was aborted because its [`Interrupt`] fired.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("operation was interrupted")]
pub struct Interrupted;

/// A cloneable interruption flag shared between a caller and the tasks that
/// may interrupt it.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    token: CancellationToken,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the caller as interrupted, waking every pending wait.
    pub fn interrupt(&self) {
        self.token.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once interrupted.
    pub async fn interrupted(&self) {
        self.token.cancelled().await;
    }

    /// Sleep for `duration` unless interrupted first.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] when the interrupt fires before the sleep ends,
    /// or had already fired.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.run(tokio::time::sleep(duration)).await
    }

    /// Drive `future` to completion unless interrupted first.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] when the interrupt fires first.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, Interrupted> {
        if self.is_interrupted() {
            return Err(Interrupted);
        }
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Interrupted),
            output = future => Ok(output),
        }
    }
}

/// Option making a retry loop observe an [`Interrupt`].
#[derive(Debug, Clone)]
pub struct Interruptible(pub Interrupt);

impl Interruptible {
    pub fn by(interrupt: &Interrupt) -> Self {
        Self(interrupt.clone())
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.0
    }
}

impl Opt for Interruptible {}
