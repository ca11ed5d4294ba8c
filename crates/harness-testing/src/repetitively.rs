//! Assert that a matcher keeps holding for a whole time budget.

use harness_core::deferred::Deferred;
use harness_core::options::OptionsByType;
use harness_core::timing::RetrySchedule;
use std::fmt::Debug;
use tracing::debug;

use crate::error::AssertionError;
use crate::matchers::Matcher;

/// Poll `deferred` until the timeout, requiring `matcher` to accept every
/// resolved value.
///
/// Temporary unavailability is tolerated. Returns the number of values that
/// matched.
///
/// # Errors
///
/// - [`AssertionError::Violated`] on the first rejected value, with attempt
///   and success counts.
/// - [`AssertionError::Unresolved`] when no value was resolved at all.
/// - [`AssertionError::PermanentlyUnavailable`] as soon as the deferred says
///   it will never resolve.
/// - [`AssertionError::Interrupted`] when an [`Interruptible`] fires.
///
/// [`Interruptible`]: harness_core::interrupt::Interruptible
pub async fn assert_that<T, D, M>(
    deferred: &D,
    matcher: &M,
    options: &OptionsByType,
) -> Result<u32, AssertionError>
where
    T: Debug,
    D: Deferred<T> + ?Sized,
    M: Matcher<T> + ?Sized,
{
    let mut schedule = RetrySchedule::from_options(options);
    let deferred_description = deferred.describe();
    let matcher_description = matcher.describe();

    let mut attempts: u32 = 0;
    let mut succeeded: u32 = 0;
    let mut last_error: Option<String> = None;

    if schedule.initial_delay().await.is_err() {
        return Err(AssertionError::Interrupted {
            deferred: deferred_description,
            matcher: matcher_description,
            attempts,
        });
    }

    loop {
        attempts += 1;
        match deferred.get().await {
            Ok(value) if matcher.matches(&value) => succeeded += 1,
            Ok(value) => {
                return Err(AssertionError::Violated {
                    deferred: deferred_description,
                    matcher: matcher_description,
                    mismatch: matcher.describe_mismatch(&value),
                    value: format!("{value:?}"),
                    attempts,
                    succeeded,
                });
            }
            Err(error) if error.is_permanent() => {
                return Err(AssertionError::PermanentlyUnavailable {
                    deferred: deferred_description,
                    matcher: matcher_description,
                    cause: error.to_string(),
                });
            }
            Err(error) => last_error = Some(error.to_string()),
        }

        let Some(wait) = schedule.next_wait() else {
            break;
        };

        if schedule.pause(wait).await.is_err() {
            return Err(AssertionError::Interrupted {
                deferred: deferred_description,
                matcher: matcher_description,
                attempts,
            });
        }
    }

    if succeeded == 0 {
        return Err(AssertionError::Unresolved {
            deferred: deferred_description,
            matcher: matcher_description,
            last_error,
        });
    }

    debug!(
        target: "harness.testing.repetitively",
        deferred = %deferred_description,
        attempts,
        succeeded,
        "Matcher held for the whole period"
    );
    Ok(succeeded)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::matchers::{is, less_than};
    use harness_core::deferred::{from_fn, invoking};
    use harness_core::options;
    use harness_core::retry::RetryFrequency;
    use harness_core::timing::within;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn every_100ms_for(seconds: u64) -> OptionsByType {
        options![
            within(Duration::from_secs(seconds)),
            RetryFrequency::every(Duration::from_millis(100)),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_holds_for_whole_period() {
        let started = Instant::now();

        let succeeded = assert_that(&invoking("steady", || 1), &is(1), &every_100ms_for(1))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(succeeded >= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_violation_fails_with_counts() {
        let count = Arc::new(AtomicUsize::new(0));
        let source = Arc::clone(&count);
        let deferred = invoking("rising", move || source.fetch_add(1, Ordering::SeqCst));

        let error = assert_that(&deferred, &less_than(3), &every_100ms_for(10))
            .await
            .unwrap_err();

        let message = error.to_string();
        assert!(message.contains("attempted 4 time(s), succeeded 3 time(s)"), "{message}");
        assert!(matches!(error, AssertionError::Violated { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_resolving_is_unresolved() {
        let deferred = from_fn("silent", || async { None::<u8> });

        let error = assert_that(&deferred, &is(0), &every_100ms_for(1))
            .await
            .unwrap_err();

        assert!(matches!(error, AssertionError::Unresolved { .. }));
    }
}
