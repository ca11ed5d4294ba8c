//! Retry interval sequences.
//!
//! A [`RetryFrequency`] is a recipe for a lazy sequence of waits between
//! attempts. Every call to [`RetryFrequency::durations`] starts the sequence
//! over, so one frequency can drive any number of retry loops.

use rand::Rng;
use std::fmt;
use std::iter;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DeferredConfig, RetryStrategy, PERPETUAL_POLLING_MS};
use crate::error::{HarnessError, Result};
use crate::options::Opt;

/// A lazy sequence of waits.
pub type Durations = Box<dyn Iterator<Item = Duration> + Send + Sync>;

/// Default growth of the exponential sequence, in percent per step.
pub const DEFAULT_EXPONENTIAL_PERCENTAGE: u64 = 50;

/// Option choosing the waits between retry attempts.
#[derive(Clone)]
pub struct RetryFrequency {
    name: String,
    factory: Arc<dyn Fn() -> Durations + Send + Sync>,
}

impl RetryFrequency {
    fn new(name: impl Into<String>, factory: impl Fn() -> Durations + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// A fresh sequence of waits.
    pub fn durations(&self) -> Durations {
        (self.factory)()
    }

    /// The same wait forever.
    pub fn every(interval: Duration) -> Self {
        Self::new(format!("every {interval:?}"), move || {
            Box::new(iter::repeat(interval))
        })
    }

    /// A wait of 250ms forever.
    pub fn standard() -> Self {
        Self::every(Duration::from_millis(PERPETUAL_POLLING_MS))
    }

    /// Fibonacci waits in milliseconds: 1, 1, 2, 3, 5, 8, ...
    pub fn fibonacci() -> Self {
        Self::new("fibonacci", || {
            let sequence = iter::successors(Some((1_u64, 1_u64)), |&(current, next)| {
                Some((next, current.saturating_add(next)))
            });
            Box::new(sequence.map(|(current, _)| Duration::from_millis(current)))
        })
    }

    /// Exponential waits starting at zero and growing 50% per step.
    pub fn exponential() -> Self {
        Self::exponential_from(Duration::ZERO, DEFAULT_EXPONENTIAL_PERCENTAGE)
    }

    /// Exponential waits starting at `initial`, each `percentage` percent
    /// longer than the last and at least one millisecond longer.
    pub fn exponential_from(initial: Duration, percentage: u64) -> Self {
        let start = u64::try_from(initial.as_millis()).unwrap_or(u64::MAX);
        Self::new(format!("exponential {percentage}%"), move || {
            let sequence = iter::successors(Some(start), move |&previous| {
                let growth = previous.saturating_mul(percentage) / 100;
                Some(previous.saturating_add(growth.max(1)))
            });
            Box::new(sequence.map(Duration::from_millis))
        })
    }

    /// Waits that bring each attempt to the given offsets from the start.
    /// The sequence ends after the last offset.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidOption`] when `instants` is empty.
    pub fn of_instants(instants: &[Duration]) -> Result<Self> {
        if instants.is_empty() {
            return Err(HarnessError::InvalidOption(
                "a retry frequency needs at least one instant".to_string(),
            ));
        }

        let mut sorted = instants.to_vec();
        sorted.sort();
        let deltas: Vec<Duration> = sorted
            .iter()
            .scan(Duration::ZERO, |previous, &instant| {
                let delta = instant.saturating_sub(*previous);
                *previous = instant;
                Some(delta)
            })
            .collect();

        Ok(Self::new("instants", move || Box::new(deltas.clone().into_iter())))
    }

    /// Each wait of `self` replaced by a uniformly random wait no longer than it.
    #[must_use]
    pub fn randomized(self) -> Self {
        let name = format!("random {}", self.name);
        Self::new(name, move || {
            Box::new(self.durations().map(|limit| {
                let millis = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
            }))
        })
    }

    /// The frequency selected by a configured strategy.
    pub fn for_strategy(strategy: RetryStrategy) -> Self {
        match strategy {
            RetryStrategy::RandomFibonacci => Self::fibonacci().randomized(),
            RetryStrategy::RandomExponential => Self::exponential().randomized(),
            RetryStrategy::Fibonacci => Self::fibonacci(),
            RetryStrategy::Exponential => Self::exponential(),
            RetryStrategy::Perpetual => Self::standard(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for RetryFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RetryFrequency").field(&self.name).finish()
    }
}

impl Opt for RetryFrequency {
    fn default_option() -> Option<Self> {
        Some(Self::for_strategy(DeferredConfig::global().retry_strategy))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn millis(frequency: &RetryFrequency, count: usize) -> Vec<u128> {
        frequency
            .durations()
            .take(count)
            .map(|d| d.as_millis())
            .collect()
    }

    #[test]
    fn test_every_repeats() {
        let frequency = RetryFrequency::every(Duration::from_millis(40));
        assert_eq!(millis(&frequency, 3), vec![40, 40, 40]);
        assert_eq!(millis(&RetryFrequency::standard(), 2), vec![250, 250]);
    }

    #[test]
    fn test_fibonacci_is_restartable() {
        let frequency = RetryFrequency::fibonacci();
        assert_eq!(millis(&frequency, 7), vec![1, 1, 2, 3, 5, 8, 13]);
        assert_eq!(millis(&frequency, 3), vec![1, 1, 2]);
    }

    #[test]
    fn test_exponential_grows_by_at_least_one_millisecond() {
        assert_eq!(
            millis(&RetryFrequency::exponential(), 6),
            vec![0, 1, 2, 3, 4, 6]
        );
        assert_eq!(
            millis(&RetryFrequency::exponential_from(Duration::from_millis(100), 100), 4),
            vec![100, 200, 400, 800]
        );
    }

    #[test]
    fn test_instants_become_deltas_and_end() {
        let frequency = RetryFrequency::of_instants(&[
            Duration::from_millis(300),
            Duration::from_millis(100),
            Duration::from_millis(600),
        ])
        .unwrap();

        assert_eq!(millis(&frequency, 10), vec![100, 200, 300]);
        assert!(RetryFrequency::of_instants(&[]).is_err());
    }

    #[test]
    fn test_randomized_stays_within_bounds() {
        let frequency = RetryFrequency::every(Duration::from_millis(20)).randomized();
        assert!(frequency.durations().take(50).all(|d| d <= Duration::from_millis(20)));
        assert!(frequency.name().starts_with("random"));
    }
}
