//! The retry loop that turns a deferred value into a resolved one.

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{Deferred, DeferredError};
use crate::options::OptionsByType;
use crate::timing::RetrySchedule;

/// Resolve `deferred`, retrying temporary unavailability.
///
/// Honours [`Timeout`], [`InitialDelay`], [`MaximumRetryDelay`],
/// [`RetryFrequency`] and [`Interruptible`] from `options`, falling back to
/// the configured defaults.
///
/// # Errors
///
/// Returns the first permanent failure unchanged. Running out of time, out of
/// retry intervals, or being interrupted yields
/// [`DeferredError::PermanentlyUnavailable`] caused by the last failure.
///
/// [`Timeout`]: crate::timing::Timeout
/// [`InitialDelay`]: crate::timing::InitialDelay
/// [`MaximumRetryDelay`]: crate::timing::MaximumRetryDelay
/// [`RetryFrequency`]: crate::retry::RetryFrequency
/// [`Interruptible`]: crate::interrupt::Interruptible
pub async fn ensure<T, D>(deferred: &D, options: &OptionsByType) -> Result<T, DeferredError>
where
    D: Deferred<T> + ?Sized,
{
    let mut schedule = RetrySchedule::from_options(options);
    let description = deferred.describe();

    if let Err(interrupted) = schedule.initial_delay().await {
        return Err(DeferredError::permanently(description).with_cause(interrupted));
    }

    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let last = match deferred.get().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_permanent() => return Err(error),
            Err(error) => error,
        };

        let Some(wait) = schedule.next_wait() else {
            debug!(
                target: "harness.core.deferred",
                deferred = %description,
                attempts,
                elapsed_ms = u64::try_from(schedule.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Giving up on deferred value"
            );
            return Err(DeferredError::permanently(description).with_cause(last));
        };

        trace!(
            target: "harness.core.deferred",
            deferred = %description,
            attempts,
            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            "Deferred value unavailable, retrying"
        );

        if schedule.pause(wait).await.is_err() {
            return Err(DeferredError::permanently(description).with_cause(last));
        }
    }
}

/// A deferred that runs the [`ensure`] retry loop on every attempt.
pub struct Ensured<D> {
    inner: D,
    options: OptionsByType,
}

impl<D> Ensured<D> {
    pub fn new(inner: D, options: OptionsByType) -> Self {
        Self { inner, options }
    }
}

#[async_trait]
impl<D, T> Deferred<T> for Ensured<D>
where
    D: Deferred<T>,
    T: Send + 'static,
{
    async fn get(&self) -> Result<T, DeferredError> {
        ensure(&self.inner, &self.options).await
    }

    fn describe(&self) -> String {
        format!("ensured({})", self.inner.describe())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::deferred::{from_fn, try_from_fn, DeferredExt};
    use crate::interrupt::{Interrupt, Interruptible};
    use crate::options;
    use crate::retry::RetryFrequency;
    use crate::timing::{within, InitialDelay};
    use tokio::time::Instant;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn counting_until(ready_after: usize) -> (Arc<AtomicUsize>, impl Deferred<usize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let deferred = from_fn("counter", move || {
            let calls = Arc::clone(&counted);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                (n >= ready_after).then_some(n)
            }
        });
        (calls, deferred)
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_after_retries() {
        let (calls, deferred) = counting_until(4);
        let options = options![within(Duration::from_secs(5)), RetryFrequency::every(Duration::from_millis(10))];

        assert_eq!(ensure(&deferred, &options).await.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_as_permanent_with_last_cause() {
        let (_, deferred) = counting_until(usize::MAX);
        let options = options![within(Duration::from_secs(2))];
        let started = Instant::now();

        let error = ensure(&deferred, &options).await.unwrap_err();

        assert!(error.is_permanent());
        assert!(error.cause().unwrap().to_string().contains("temporarily"));
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_stops_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let deferred = try_from_fn("broken", move || {
            let calls = Arc::clone(&counted);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u8, _>(DeferredError::permanently("broken"))
            }
        });

        let error = ensure(&deferred, &OptionsByType::empty()).await.unwrap_err();

        assert!(error.is_permanent());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_intervals_give_up() {
        let (calls, deferred) = counting_until(usize::MAX);
        let frequency = RetryFrequency::of_instants(&[Duration::from_millis(5)]).unwrap();

        let error = ensure(&deferred, &options![frequency]).await.unwrap_err();

        assert!(error.is_permanent());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_delay_precedes_first_attempt() {
        let (calls, deferred) = counting_until(1);
        let started = Instant::now();

        let value = ensure(&deferred, &options![InitialDelay(Duration::from_millis(300))])
            .await
            .unwrap();

        assert_eq!(value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_stops_retrying() {
        let (_, deferred) = counting_until(usize::MAX);
        let interrupt = Interrupt::new();
        interrupt.interrupt();

        let error = ensure(&deferred, &options![Interruptible::by(&interrupt)])
            .await
            .unwrap_err();

        assert!(error.is_permanent());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensured_wraps_the_loop() {
        let (_, deferred) = counting_until(3);
        let ensured = deferred.ensured(options![RetryFrequency::every(Duration::from_millis(1))]);

        assert_eq!(ensured.get().await.unwrap(), 3);
        assert!(ensured.describe().starts_with("ensured("));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_retries_normally() {
        let (calls, deferred) = counting_until(3);
        let options = options![within(Duration::MAX), RetryFrequency::every(Duration::from_millis(10))];

        assert_eq!(ensure(&deferred, &options).await.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
