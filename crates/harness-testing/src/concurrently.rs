//! Assertions that keep running in the background while the caller works.
//!
//! [`assert_that`] spawns a task that repeatedly applies the repetitive
//! assertion until the returned [`ConcurrentAssertion`] is closed or dropped.
//! With [`FailFast`] enabled, a failure interrupts the caller's [`Interrupt`]
//! so that its pending waits abort promptly.

use harness_core::deferred::Deferred;
use harness_core::interrupt::{Interrupt, Interruptible};
use harness_core::options::{Opt, OptionsByType};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::AssertionError;
use crate::matchers::Matcher;
use crate::repetitively;

/// Option deciding whether a concurrent failure interrupts the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailFast(pub bool);

impl FailFast {
    pub fn enabled() -> Self {
        Self(true)
    }

    pub fn disabled() -> Self {
        Self(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.0
    }
}

impl Opt for FailFast {
    fn default_option() -> Option<Self> {
        Some(Self::disabled())
    }
}

type FailureSlot = Arc<Mutex<Option<AssertionError>>>;

/// Handle to an assertion running in the background.
///
/// Dropping the handle stops the background task.
pub struct ConcurrentAssertion {
    stop: Interrupt,
    origin: Interrupt,
    failure: FailureSlot,
    task: Option<JoinHandle<()>>,
}

impl ConcurrentAssertion {
    /// Surface a failure recorded so far. A failure is reported once; later
    /// calls and [`close`](Self::close) no longer repeat it.
    ///
    /// # Errors
    ///
    /// Returns the recorded [`AssertionError`].
    pub fn check(&self) -> Result<(), AssertionError> {
        match take(&self.failure) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Stop the background task and report any failure not yet checked.
    /// Closing again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the unchecked [`AssertionError`], if any.
    pub async fn close(&mut self) -> Result<(), AssertionError> {
        self.stop.interrupt();
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                warn!(
                    target: "harness.testing.concurrently",
                    error = %error,
                    "Concurrent assertion task did not finish cleanly"
                );
            }
        }
        self.check()
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }

    /// The interrupt that fail-fast fires: the caller's [`Interruptible`]
    /// when one was supplied, otherwise a fresh one.
    pub fn origin(&self) -> &Interrupt {
        &self.origin
    }
}

impl Drop for ConcurrentAssertion {
    fn drop(&mut self) {
        self.stop.interrupt();
    }
}

fn take(failure: &FailureSlot) -> Option<AssertionError> {
    failure.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// Start asserting, in the background, that every value `deferred` resolves
/// to satisfies `matcher`.
///
/// Must be called within a tokio runtime.
pub fn assert_that<T, D, M>(deferred: D, matcher: M, options: OptionsByType) -> ConcurrentAssertion
where
    T: Debug + Send + 'static,
    D: Deferred<T> + 'static,
    M: Matcher<T> + 'static,
{
    let stop = Interrupt::new();
    let origin = options
        .find::<Interruptible>()
        .map(|interruptible| interruptible.interrupt().clone())
        .unwrap_or_default();
    let fail_fast = options
        .resolve::<FailFast>()
        .is_some_and(|fail_fast| fail_fast.is_enabled());

    let mut loop_options = options;
    loop_options.add(Interruptible::by(&stop));

    let failure: FailureSlot = Arc::new(Mutex::new(None));
    let task = tokio::spawn({
        let failure = Arc::clone(&failure);
        let origin = origin.clone();
        async move {
            loop {
                match repetitively::assert_that(&deferred, &matcher, &loop_options).await {
                    Ok(_) => {}
                    Err(error) if error.is_interrupted() => break,
                    Err(error) => {
                        warn!(
                            target: "harness.testing.concurrently",
                            deferred = %error.deferred(),
                            fail_fast,
                            error = %error,
                            "Concurrent assertion failed"
                        );
                        *failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
                        if fail_fast {
                            origin.interrupt();
                        }
                        break;
                    }
                }
            }
            debug!(target: "harness.testing.concurrently", "Concurrent assertion stopped");
        }
    });

    ConcurrentAssertion {
        stop,
        origin,
        failure,
        task: Some(task),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::matchers::{is, less_than};
    use harness_core::deferred::DeferredAtomicUsize;
    use harness_core::options;
    use harness_core::retry::RetryFrequency;
    use harness_core::timing::within;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn fast_options() -> OptionsByType {
        options![
            within(Duration::from_millis(200)),
            RetryFrequency::every(Duration::from_millis(5)),
        ]
    }

    #[tokio::test]
    async fn test_holding_assertion_closes_cleanly() {
        let counter = Arc::new(AtomicUsize::new(1));
        let mut assertion = assert_that(
            DeferredAtomicUsize(Arc::clone(&counter)),
            is(1),
            fast_options(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(assertion.check().is_ok());

        assert!(assertion.close().await.is_ok());
        assert!(assertion.is_closed());
        assert!(assertion.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_is_reported_on_close() {
        let counter = Arc::new(AtomicUsize::new(1));
        let mut assertion = assert_that(
            DeferredAtomicUsize(Arc::clone(&counter)),
            less_than(5),
            fast_options(),
        );

        counter.store(10, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let error = assertion.close().await.unwrap_err();
        assert!(matches!(error, AssertionError::Violated { .. }));
        assert!(!assertion.origin().is_interrupted());
    }

    #[tokio::test]
    async fn test_checked_failure_is_not_repeated() {
        let counter = Arc::new(AtomicUsize::new(7));
        let mut assertion = assert_that(
            DeferredAtomicUsize(Arc::clone(&counter)),
            is(0),
            fast_options(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(assertion.check().is_err());
        assert!(assertion.check().is_ok());
        assert!(assertion.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_fast_interrupts_the_caller() {
        let caller = Interrupt::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let _assertion = assert_that(
            DeferredAtomicUsize(counter),
            is(1),
            options![
                FailFast::enabled(),
                Interruptible::by(&caller),
                RetryFrequency::every(Duration::from_millis(5)),
            ],
        );

        let started = std::time::Instant::now();
        let slept = caller.sleep(Duration::from_secs(5)).await;

        assert!(slept.is_err());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_fail_fast_defaults_to_disabled() {
        let mut options = OptionsByType::empty();
        assert_eq!(*options.get::<FailFast>().unwrap(), FailFast::disabled());
    }
}
