//! Assert that a deferred value eventually satisfies a matcher.

use harness_core::deferred::{existing, Deferred, DeferredExt};
use harness_core::options::OptionsByType;
use harness_core::timing::RetrySchedule;
use std::fmt::Debug;
use tracing::debug;

use crate::error::{AssertionError, SIMPLE_VALUE_NOTE};
use crate::matchers::Matcher;

/// Poll `deferred` until `matcher` accepts a value, returning that value.
///
/// The loop sleeps between attempts according to the retry options in
/// `options`, evaluating the matcher before every sleep. Plain values are
/// evaluated once.
///
/// # Errors
///
/// - [`AssertionError::Mismatch`] when values were resolved but none matched
///   in time; the last value is embedded.
/// - [`AssertionError::Unresolved`] when no value was resolved in time.
/// - [`AssertionError::PermanentlyUnavailable`] as soon as the deferred says
///   it will never resolve.
/// - [`AssertionError::Interrupted`] when an [`Interruptible`] fires.
///
/// [`Interruptible`]: harness_core::interrupt::Interruptible
pub async fn assert_that<T, D, M>(
    deferred: &D,
    matcher: &M,
    options: &OptionsByType,
) -> Result<T, AssertionError>
where
    T: Debug,
    D: Deferred<T> + ?Sized,
    M: Matcher<T> + ?Sized,
{
    let mut schedule = RetrySchedule::from_options(options);
    let deferred_description = deferred.describe();
    let matcher_description = matcher.describe();
    let mut attempts: u32 = 0;

    let interrupted = |attempts| AssertionError::Interrupted {
        deferred: deferred_description.clone(),
        matcher: matcher_description.clone(),
        attempts,
    };

    if schedule.initial_delay().await.is_err() {
        return Err(interrupted(attempts));
    }

    let mut last_value: Option<(String, String)> = None;
    let mut last_error: Option<String> = None;

    loop {
        attempts += 1;
        match deferred.get().await {
            Ok(value) if matcher.matches(&value) => {
                debug!(
                    target: "harness.testing.eventually",
                    deferred = %deferred_description,
                    attempts,
                    "Assertion satisfied"
                );
                return Ok(value);
            }
            Ok(value) => {
                last_value = Some((format!("{value:?}"), matcher.describe_mismatch(&value)));
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

        let wait = if deferred.is_simple() {
            None
        } else {
            schedule.next_wait()
        };

        let Some(wait) = wait else {
            let note = if deferred.is_simple() {
                SIMPLE_VALUE_NOTE.to_string()
            } else {
                String::new()
            };
            return Err(match last_value {
                Some((value, mismatch)) => AssertionError::Mismatch {
                    deferred: deferred_description,
                    matcher: matcher_description,
                    value,
                    mismatch,
                    attempts,
                    note,
                },
                None => AssertionError::Unresolved {
                    deferred: deferred_description,
                    matcher: matcher_description,
                    last_error,
                },
            });
        };

        if schedule.pause(wait).await.is_err() {
            return Err(interrupted(attempts));
        }
    }
}

/// Assert that a plain value satisfies `matcher`. Never retried.
///
/// # Errors
///
/// Returns [`AssertionError::Mismatch`] when the value is rejected.
pub async fn assert_value<T, M>(value: T, matcher: &M) -> Result<T, AssertionError>
where
    T: Clone + Debug + Send + Sync + 'static,
    M: Matcher<T> + ?Sized,
{
    assert_that(&existing(value), matcher, &OptionsByType::empty()).await
}

/// Poll `deferred`, passing each value through `function` before matching.
///
/// # Errors
///
/// As [`assert_that`].
pub async fn assert_that_fn<T, U, D, F, M>(
    deferred: D,
    function: F,
    matcher: &M,
    options: &OptionsByType,
) -> Result<U, AssertionError>
where
    T: Send + 'static,
    U: Debug + Send + 'static,
    D: Deferred<T>,
    F: Fn(T) -> U + Send + Sync,
    M: Matcher<U> + ?Sized,
{
    assert_that(&deferred.map(function), matcher, options).await
}
