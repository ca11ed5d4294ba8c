//! Assertion engine tests with scripted deferred values.
//!
//! `SequenceDeferred` returns a fixed series of outcomes, and
//! `RecordingMatcher` counts evaluations, so each test can tell how often the
//! engine polled.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use harness_core::interrupt::{Interrupt, Interruptible};
use harness_test_utils::{fast_retry, Outcome, RecordingMatcher, SequenceDeferred};
use harness_testing::matchers::{greater_than, is};
use harness_testing::{concurrently, eventually, repetitively, AssertionError, FailFast};
use std::time::Duration;

/// Test that temporary failures are retried until a value matches.
#[tokio::test(start_paused = true)]
async fn test_eventually_retries_temporary_failures() -> Result<(), anyhow::Error> {
    let deferred = SequenceDeferred::available_after("server", 3, 42);
    let matcher = RecordingMatcher::new(is(42));

    let value = eventually::assert_that(&deferred, &matcher, &fast_retry(Duration::from_secs(1))).await?;

    assert_eq!(value, 42);
    assert_eq!(deferred.calls(), 4);
    assert_eq!(matcher.evaluations(), 1);
    Ok(())
}

/// Test that the last resolved value is embedded in a mismatch.
#[tokio::test(start_paused = true)]
async fn test_eventually_reports_last_value() {
    let deferred = SequenceDeferred::new(
        "counter",
        vec![Outcome::Value(1), Outcome::Temporary, Outcome::Value(2)],
    );

    let error = eventually::assert_that(&deferred, &is(5), &fast_retry(Duration::from_millis(200)))
        .await
        .unwrap_err();

    match &error {
        AssertionError::Mismatch { value, .. } => assert_eq!(value, "2"),
        other => panic!("expected a mismatch, got {other}"),
    }
    assert!(error.to_string().contains("[counter]"));
}

/// Test that a permanent failure stops polling at once.
#[tokio::test(start_paused = true)]
async fn test_eventually_stops_on_permanent_failure() {
    let deferred = SequenceDeferred::new(
        "database",
        vec![Outcome::Temporary, Outcome::Permanent, Outcome::Value(1)],
    );

    let error = eventually::assert_that(&deferred, &is(1), &fast_retry(Duration::from_secs(10)))
        .await
        .unwrap_err();

    assert!(matches!(error, AssertionError::PermanentlyUnavailable { .. }));
    assert_eq!(deferred.calls(), 2);
}

/// Test that a repetitive assertion evaluates the matcher on every poll.
#[tokio::test(start_paused = true)]
async fn test_repetitively_counts_successes() -> Result<(), anyhow::Error> {
    let deferred = SequenceDeferred::new("load", vec![Outcome::Value(10)]);
    let matcher = RecordingMatcher::new(greater_than(5));

    let succeeded =
        repetitively::assert_that(&deferred, &matcher, &fast_retry(Duration::from_millis(100))).await?;

    assert!(succeeded > 1);
    assert_eq!(usize::try_from(succeeded)?, matcher.evaluations());
    Ok(())
}

/// Test that a repetitive assertion tolerates temporary failures between
/// matching values.
#[tokio::test(start_paused = true)]
async fn test_repetitively_skips_temporary_failures() -> Result<(), anyhow::Error> {
    let deferred = SequenceDeferred::new(
        "flaky",
        vec![Outcome::Value(1), Outcome::Temporary, Outcome::Value(1)],
    );

    let succeeded =
        repetitively::assert_that(&deferred, &is(1), &fast_retry(Duration::from_millis(100))).await?;

    assert!(succeeded >= 2);
    Ok(())
}

/// Test that the first violating value fails a repetitive assertion.
#[tokio::test(start_paused = true)]
async fn test_repetitively_fails_on_violation() {
    let deferred = SequenceDeferred::new(
        "queue-depth",
        vec![Outcome::Value(0), Outcome::Value(0), Outcome::Value(9)],
    );

    let error = repetitively::assert_that(&deferred, &is(0), &fast_retry(Duration::from_secs(1)))
        .await
        .unwrap_err();

    match error {
        AssertionError::Violated {
            attempts, succeeded, ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(succeeded, 2);
        }
        other => panic!("expected a violation, got {other}"),
    }
}

/// Test that an interruptible stops a long-running assertion.
#[tokio::test(start_paused = true)]
async fn test_interrupt_stops_assertion() {
    let deferred = SequenceDeferred::new("never", vec![Outcome::<i32>::Temporary]);
    let interrupt = Interrupt::new();
    let mut options = fast_retry(Duration::from_secs(60));
    options.add(Interruptible::by(&interrupt));

    let stopper = interrupt.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.interrupt();
    });

    let error = eventually::assert_that(&deferred, &is(1), &options)
        .await
        .unwrap_err();
    assert!(error.is_interrupted());
}

/// Test that a concurrent assertion reports its failure when closed.
#[tokio::test(start_paused = true)]
async fn test_concurrent_failure_reported_on_close() {
    let deferred = SequenceDeferred::new("health", vec![Outcome::Value(true), Outcome::Value(false)]);

    let mut assertion = concurrently::assert_that(deferred, is(true), fast_retry(Duration::from_secs(60)));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let error = assertion.close().await.unwrap_err();
    assert!(matches!(error, AssertionError::Violated { .. }));
    assert!(!assertion.origin().is_interrupted());
}

/// Test that fail-fast interrupts work bound to the assertion's origin.
#[tokio::test(start_paused = true)]
async fn test_concurrent_fail_fast() {
    let deferred = SequenceDeferred::new("health", vec![Outcome::Value(true), Outcome::Value(false)]);
    let mut options = fast_retry(Duration::from_secs(60));
    options.add(FailFast::enabled());

    let mut assertion = concurrently::assert_that(deferred, is(true), options);

    let started = tokio::time::Instant::now();
    let slept = assertion.origin().sleep(Duration::from_secs(30)).await;

    assert!(slept.is_err());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(assertion.close().await.is_err());
}
