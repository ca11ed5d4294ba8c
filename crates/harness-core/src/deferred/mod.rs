//! Deferred values.
//!
//! A [`Deferred`] is a handle to a value that may not be available yet. Each
//! call to [`Deferred::get`] is a single attempt with three outcomes: the
//! value, [`DeferredError::TemporarilyUnavailable`] (try again later) or
//! [`DeferredError::PermanentlyUnavailable`] (stop trying). A deferred never
//! waits or retries on its own; [`ensure`] and the assertion engine own the
//! retry loop.

mod adapters;
mod ensured;

pub use adapters::{
    existing, from_fn, invoking, try_from_fn, Cached, DeferredAtomicBool, DeferredAtomicI64,
    DeferredAtomicUsize, DeferredConnection, DeferredFuture, Existing, FromFn, Invoking, Map,
    Matching, Supervised, TryFromFn, SUPERVISED_RETRY_DELAY,
};
pub use ensured::{ensure, Ensured};

use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use thiserror::Error;

use crate::error::BoxError;
use crate::options::OptionsByType;

// ============================================================================
// Errors
// ============================================================================

/// Why a single attempt to resolve a deferred value failed.
#[derive(Debug, Error)]
pub enum DeferredError {
    /// Not available yet; a later attempt may succeed.
    #[error("{deferred} is temporarily unavailable{}", describe_cause(.cause))]
    TemporarilyUnavailable {
        deferred: String,
        #[source]
        cause: Option<BoxError>,
    },

    /// Will never become available; retrying is pointless.
    #[error("{deferred} is permanently unavailable{}", describe_cause(.cause))]
    PermanentlyUnavailable {
        deferred: String,
        #[source]
        cause: Option<BoxError>,
    },
}

fn describe_cause(cause: &Option<BoxError>) -> String {
    cause
        .as_ref()
        .map(|c| format!(" ({c})"))
        .unwrap_or_default()
}

impl DeferredError {
    pub fn temporarily(deferred: impl Into<String>) -> Self {
        DeferredError::TemporarilyUnavailable {
            deferred: deferred.into(),
            cause: None,
        }
    }

    pub fn permanently(deferred: impl Into<String>) -> Self {
        DeferredError::PermanentlyUnavailable {
            deferred: deferred.into(),
            cause: None,
        }
    }

    /// Attach the underlying failure.
    #[must_use]
    pub fn with_cause(self, cause: impl Into<BoxError>) -> Self {
        match self {
            DeferredError::TemporarilyUnavailable { deferred, .. } => {
                DeferredError::TemporarilyUnavailable {
                    deferred,
                    cause: Some(cause.into()),
                }
            }
            DeferredError::PermanentlyUnavailable { deferred, .. } => {
                DeferredError::PermanentlyUnavailable {
                    deferred,
                    cause: Some(cause.into()),
                }
            }
        }
    }

    /// Classify an I/O failure.
    ///
    /// Connectivity failures mean the other side is not ready yet and are
    /// temporary. Anything else is permanent.
    pub fn from_io(deferred: impl Into<String>, error: io::Error) -> Self {
        let base = match error.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::NotFound => DeferredError::temporarily(deferred),
            _ => DeferredError::permanently(deferred),
        };
        base.with_cause(error)
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, DeferredError::TemporarilyUnavailable { .. })
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, DeferredError::PermanentlyUnavailable { .. })
    }

    /// Description of the deferred that failed.
    pub fn deferred(&self) -> &str {
        match self {
            DeferredError::TemporarilyUnavailable { deferred, .. }
            | DeferredError::PermanentlyUnavailable { deferred, .. } => deferred,
        }
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            DeferredError::TemporarilyUnavailable { cause, .. }
            | DeferredError::PermanentlyUnavailable { cause, .. } => cause.as_deref(),
        }
    }
}

// ============================================================================
// Deferred
// ============================================================================

/// A value that may not be available yet.
#[async_trait]
pub trait Deferred<T>: Send + Sync {
    /// Make one attempt to resolve the value. Must return promptly.
    async fn get(&self) -> Result<T, DeferredError>;

    /// Human readable description used in failure messages.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// Whether this is a plain value whose outcome never changes, so retrying
    /// it is pointless.
    fn is_simple(&self) -> bool {
        false
    }
}

#[async_trait]
impl<T, D> Deferred<T> for Arc<D>
where
    T: Send + 'static,
    D: Deferred<T> + ?Sized,
{
    async fn get(&self) -> Result<T, DeferredError> {
        (**self).get().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn is_simple(&self) -> bool {
        (**self).is_simple()
    }
}

#[async_trait]
impl<T, D> Deferred<T> for Box<D>
where
    T: Send + 'static,
    D: Deferred<T> + ?Sized,
{
    async fn get(&self) -> Result<T, DeferredError> {
        (**self).get().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn is_simple(&self) -> bool {
        (**self).is_simple()
    }
}

/// Combinators available on every deferred.
pub trait DeferredExt<T>: Deferred<T> + Sized {
    /// Transform each resolved value.
    fn map<U, F>(self, function: F) -> Map<Self, F, T>
    where
        F: Fn(T) -> U + Send + Sync,
    {
        Map::new(self, function)
    }

    /// Only resolve values satisfying `predicate`; others are temporarily
    /// unavailable.
    fn matching<P>(self, predicate: P) -> Matching<Self, P>
    where
        P: Fn(&T) -> bool + Send + Sync,
    {
        Matching::new(self, predicate)
    }

    /// Remember the first resolved value.
    fn cached(self) -> Cached<Self, T>
    where
        T: Clone + Send + Sync,
    {
        Cached::new(self)
    }

    /// Stop consulting the source for a short while after each failure.
    fn supervised(self) -> Supervised<Self> {
        Supervised::new(self, SUPERVISED_RETRY_DELAY)
    }

    /// Resolve with the retry loop of [`ensure`] on every `get`.
    fn ensured(self, options: OptionsByType) -> Ensured<Self> {
        Ensured::new(self, options)
    }
}

impl<T, D: Deferred<T>> DeferredExt<T> for D {}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_io_connectivity_errors_are_temporary() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let error = DeferredError::from_io("tcp://localhost:1", refused);

        assert!(error.is_temporary());
        assert!(error.source().is_some());
        assert_eq!(error.deferred(), "tcp://localhost:1");
        assert!(error.to_string().contains("refused"));
    }

    #[test]
    fn test_other_io_errors_are_permanent() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(DeferredError::from_io("file", denied).is_permanent());
    }

    #[test]
    fn test_display_without_cause() {
        let error = DeferredError::temporarily("counter");
        assert_eq!(error.to_string(), "counter is temporarily unavailable");
        assert!(error.cause().is_none());
    }
}
