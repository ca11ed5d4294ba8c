//! Deferred values with scripted outcomes.

use async_trait::async_trait;
use harness_core::deferred::{Deferred, DeferredError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One scripted result of [`Deferred::get`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Value(T),
    Temporary,
    Permanent,
}

/// A deferred that returns its outcomes in order, repeating the last one
/// forever.
///
/// ```rust,ignore
/// let deferred = SequenceDeferred::new("server", vec![
///     Outcome::Temporary,
///     Outcome::Value(1),
///     Outcome::Value(2),
/// ]);
/// ```
#[derive(Debug, Clone)]
pub struct SequenceDeferred<T> {
    description: String,
    outcomes: Arc<Vec<Outcome<T>>>,
    calls: Arc<AtomicUsize>,
}

impl<T> SequenceDeferred<T> {
    /// Panics when `outcomes` is empty.
    #[must_use]
    pub fn new(description: impl Into<String>, outcomes: Vec<Outcome<T>>) -> Self {
        assert!(!outcomes.is_empty(), "a sequence needs at least one outcome");
        Self {
            description: description.into(),
            outcomes: Arc::new(outcomes),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `temporary` temporary failures, then `value` forever.
    #[must_use]
    pub fn available_after(description: impl Into<String>, temporary: usize, value: T) -> Self
    where
        T: Clone,
    {
        let mut outcomes = vec![Outcome::Temporary; temporary];
        outcomes.push(Outcome::Value(value));
        Self::new(description, outcomes)
    }

    /// Number of calls to `get` so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T> Deferred<T> for SequenceDeferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self) -> Result<T, DeferredError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .outcomes
            .get(call)
            .or_else(|| self.outcomes.last())
            .expect("sequence is never empty");

        match outcome {
            Outcome::Value(value) => Ok(value.clone()),
            Outcome::Temporary => Err(DeferredError::temporarily(&self.description)),
            Outcome::Permanent => Err(DeferredError::permanently(&self.description)),
        }
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
