//! Time budget options for retry loops and lifecycle waits.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::DeferredConfig;
use crate::interrupt::{Interrupt, Interruptible, Interrupted};
use crate::options::{Opt, OptionsByType};
use crate::retry::{Durations, RetryFrequency};

/// Total time allowed for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout(pub Duration);

impl Timeout {
    pub fn after(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn duration(&self) -> Duration {
        self.0
    }
}

impl Opt for Timeout {
    fn default_option() -> Option<Self> {
        Some(Self(DeferredConfig::global().retry_timeout))
    }
}

/// Shorthand for `Timeout::after(duration)`.
pub fn within(duration: Duration) -> Timeout {
    Timeout(duration)
}

/// Wait applied once before the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialDelay(pub Duration);

impl InitialDelay {
    pub fn none() -> Self {
        Self(Duration::ZERO)
    }

    pub fn duration(&self) -> Duration {
        self.0
    }
}

impl Opt for InitialDelay {
    fn default_option() -> Option<Self> {
        Some(Self::none())
    }
}

/// Shorthand for `InitialDelay(duration)`.
pub fn delayed_by(duration: Duration) -> InitialDelay {
    InitialDelay(duration)
}

/// Upper bound on any single wait between two attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaximumRetryDelay(pub Duration);

impl MaximumRetryDelay {
    pub fn duration(&self) -> Duration {
        self.0
    }
}

impl Opt for MaximumRetryDelay {
    fn default_option() -> Option<Self> {
        Some(Self(DeferredConfig::global().maximum_polling_time))
    }
}

/// The retry budget resolved from a set of options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub timeout: Duration,
    pub initial_delay: Duration,
    pub maximum_delay: Duration,
}

impl RetryBudget {
    pub fn from_options(options: &OptionsByType) -> Self {
        let config = DeferredConfig::global();
        Self {
            timeout: options
                .resolve::<Timeout>()
                .map_or(config.retry_timeout, |t| t.duration()),
            initial_delay: options
                .resolve::<InitialDelay>()
                .map_or(Duration::ZERO, |d| d.duration()),
            maximum_delay: options
                .resolve::<MaximumRetryDelay>()
                .map_or(config.maximum_polling_time, |d| d.duration()),
        }
    }
}

/// The state of one retry loop: its budget, the remaining waits, and the
/// interrupt it observes.
pub struct RetrySchedule {
    budget: RetryBudget,
    waits: Durations,
    interrupt: Interrupt,
    started: Instant,
}

impl RetrySchedule {
    /// Start a schedule now from [`Timeout`], [`InitialDelay`],
    /// [`MaximumRetryDelay`], [`RetryFrequency`] and [`Interruptible`].
    pub fn from_options(options: &OptionsByType) -> Self {
        let frequency = options
            .resolve::<RetryFrequency>()
            .map_or_else(RetryFrequency::standard, |f| f.as_ref().clone());
        let interrupt = options
            .find::<Interruptible>()
            .map(|i| i.interrupt().clone())
            .unwrap_or_default();

        Self {
            budget: RetryBudget::from_options(options),
            waits: frequency.durations(),
            interrupt,
            started: Instant::now(),
        }
    }

    pub fn budget(&self) -> &RetryBudget {
        &self.budget
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.timeout.saturating_sub(self.elapsed())
    }

    /// Wait out the initial delay, bounded by the timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] when the loop's interrupt fires.
    pub async fn initial_delay(&self) -> Result<(), Interrupted> {
        if self.budget.initial_delay.is_zero() {
            return Ok(());
        }
        self.interrupt
            .sleep(self.budget.initial_delay.min(self.budget.timeout))
            .await
    }

    /// The next wait, capped by the maximum retry delay and the remaining
    /// time, or `None` once time or intervals have run out.
    pub fn next_wait(&mut self) -> Option<Duration> {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return None;
        }
        self.waits
            .next()
            .map(|wait| wait.min(self.budget.maximum_delay).min(remaining))
    }

    /// Sleep for `wait` unless interrupted.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] when the loop's interrupt fires.
    pub async fn pause(&self, wait: Duration) -> Result<(), Interrupted> {
        self.interrupt.sleep(wait).await
    }
}
