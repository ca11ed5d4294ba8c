//! Ready-made deferred values and combinators.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::sync::OnceCell;
use tokio::time::Instant;

use super::{Deferred, DeferredError};

/// How long [`Supervised`] treats its source as inaccessible after a failure.
pub const SUPERVISED_RETRY_DELAY: Duration = Duration::from_millis(250);

// ============================================================================
// Plain values and functions
// ============================================================================

/// A value that is already known.
#[derive(Debug, Clone)]
pub struct Existing<T> {
    value: T,
}

pub fn existing<T>(value: T) -> Existing<T> {
    Existing { value }
}

#[async_trait]
impl<T> Deferred<T> for Existing<T>
where
    T: Clone + fmt::Debug + Send + Sync + 'static,
{
    async fn get(&self) -> Result<T, DeferredError> {
        Ok(self.value.clone())
    }

    fn describe(&self) -> String {
        format!("{:?}", self.value)
    }

    fn is_simple(&self) -> bool {
        true
    }
}

/// A value produced by calling a function on every attempt.
pub struct Invoking<F> {
    description: String,
    function: F,
}

/// Resolve by calling `function`; every call succeeds.
pub fn invoking<T, F>(description: impl Into<String>, function: F) -> Invoking<F>
where
    F: Fn() -> T + Send + Sync,
{
    Invoking {
        description: description.into(),
        function,
    }
}

#[async_trait]
impl<T, F> Deferred<T> for Invoking<F>
where
    T: Send + 'static,
    F: Fn() -> T + Send + Sync,
{
    async fn get(&self) -> Result<T, DeferredError> {
        Ok((self.function)())
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// A value produced by an async function that returns `None` while the value
/// is not available.
pub struct FromFn<F> {
    description: String,
    function: F,
}

pub fn from_fn<T, F, Fut>(description: impl Into<String>, function: F) -> FromFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Option<T>> + Send,
{
    FromFn {
        description: description.into(),
        function,
    }
}

#[async_trait]
impl<T, F, Fut> Deferred<T> for FromFn<F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Option<T>> + Send,
{
    async fn get(&self) -> Result<T, DeferredError> {
        (self.function)()
            .await
            .ok_or_else(|| DeferredError::temporarily(self.description.clone()))
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// A value produced by an async function that classifies its own failures.
pub struct TryFromFn<F> {
    description: String,
    function: F,
}

pub fn try_from_fn<T, F, Fut>(description: impl Into<String>, function: F) -> TryFromFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, DeferredError>> + Send,
{
    TryFromFn {
        description: description.into(),
        function,
    }
}

#[async_trait]
impl<T, F, Fut> Deferred<T> for TryFromFn<F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, DeferredError>> + Send,
{
    async fn get(&self) -> Result<T, DeferredError> {
        (self.function)().await
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

// ============================================================================
// Atomics
// ============================================================================

macro_rules! deferred_atomic {
    ($name:ident, $atomic:ty, $value:ty) => {
        #[doc = concat!("The current value of a shared `", stringify!($atomic), "`.")]
        #[derive(Debug, Clone)]
        pub struct $name(pub Arc<$atomic>);

        #[async_trait]
        impl Deferred<$value> for $name {
            async fn get(&self) -> Result<$value, DeferredError> {
                Ok(self.0.load(Ordering::SeqCst))
            }

            fn describe(&self) -> String {
                format!("{}({})", stringify!($name), self.0.load(Ordering::SeqCst))
            }
        }
    };
}

deferred_atomic!(DeferredAtomicBool, AtomicBool, bool);
deferred_atomic!(DeferredAtomicUsize, AtomicUsize, usize);
deferred_atomic!(DeferredAtomicI64, AtomicI64, i64);

// ============================================================================
// Combinators
// ============================================================================

/// Resolved values of `D` passed through a function.
pub struct Map<D, F, T> {
    inner: D,
    function: F,
    _source: PhantomData<fn() -> T>,
}

impl<D, F, T> Map<D, F, T> {
    pub(super) fn new(inner: D, function: F) -> Self {
        Self {
            inner,
            function,
            _source: PhantomData,
        }
    }
}

#[async_trait]
impl<D, F, T, U> Deferred<U> for Map<D, F, T>
where
    D: Deferred<T>,
    F: Fn(T) -> U + Send + Sync,
    T: Send + 'static,
    U: Send + 'static,
{
    async fn get(&self) -> Result<U, DeferredError> {
        self.inner.get().await.map(&self.function)
    }

    fn describe(&self) -> String {
        format!("map({})", self.inner.describe())
    }

    fn is_simple(&self) -> bool {
        self.inner.is_simple()
    }
}

/// Resolved values of `D` that satisfy a predicate.
pub struct Matching<D, P> {
    inner: D,
    predicate: P,
}

impl<D, P> Matching<D, P> {
    pub(super) fn new(inner: D, predicate: P) -> Self {
        Self { inner, predicate }
    }
}

#[async_trait]
impl<D, P, T> Deferred<T> for Matching<D, P>
where
    D: Deferred<T>,
    P: Fn(&T) -> bool + Send + Sync,
    T: Send + 'static,
{
    async fn get(&self) -> Result<T, DeferredError> {
        let value = self.inner.get().await?;
        if (self.predicate)(&value) {
            Ok(value)
        } else {
            Err(DeferredError::temporarily(self.describe()))
        }
    }

    fn describe(&self) -> String {
        format!("matching({})", self.inner.describe())
    }
}

/// Remembers the first value `D` resolves.
pub struct Cached<D, T> {
    inner: D,
    value: OnceCell<T>,
}

impl<D, T> Cached<D, T> {
    pub(super) fn new(inner: D) -> Self {
        Self {
            inner,
            value: OnceCell::new(),
        }
    }
}

#[async_trait]
impl<D, T> Deferred<T> for Cached<D, T>
where
    D: Deferred<T>,
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self) -> Result<T, DeferredError> {
        self.value
            .get_or_try_init(|| self.inner.get())
            .await
            .cloned()
    }

    fn describe(&self) -> String {
        format!("cached({})", self.inner.describe())
    }

    fn is_simple(&self) -> bool {
        self.value.initialized() || self.inner.is_simple()
    }
}

/// Serializes access to `D` and, after a failure, reports it temporarily
/// unavailable without consulting it until the retry delay has passed.
pub struct Supervised<D> {
    inner: D,
    retry_delay: Duration,
    failed_at: tokio::sync::Mutex<Option<Instant>>,
}

impl<D> Supervised<D> {
    pub fn new(inner: D, retry_delay: Duration) -> Self {
        Self {
            inner,
            retry_delay,
            failed_at: tokio::sync::Mutex::new(None),
        }
    }

    /// Whether the source is currently treated as inaccessible.
    pub async fn is_accessible(&self) -> bool {
        self.failed_at
            .lock()
            .await
            .map_or(true, |at| at.elapsed() >= self.retry_delay)
    }
}

#[async_trait]
impl<D, T> Deferred<T> for Supervised<D>
where
    D: Deferred<T>,
    T: Send + 'static,
{
    async fn get(&self) -> Result<T, DeferredError> {
        let mut failed_at = self.failed_at.lock().await;

        if let Some(at) = *failed_at {
            if at.elapsed() < self.retry_delay {
                return Err(DeferredError::temporarily(self.describe()));
            }
        }

        match self.inner.get().await {
            Ok(value) => {
                *failed_at = None;
                Ok(value)
            }
            Err(error) => {
                *failed_at = Some(Instant::now());
                Err(error)
            }
        }
    }

    fn describe(&self) -> String {
        format!("supervised({})", self.inner.describe())
    }
}

// ============================================================================
// Futures and connections
// ============================================================================

enum FutureState<T> {
    Pending(oneshot::Receiver<T>),
    Ready(T),
    Abandoned,
}

/// A value delivered once through a oneshot channel.
///
/// Pending is temporary, a dropped sender is permanent, and a delivered
/// value is returned on every later attempt.
pub struct DeferredFuture<T> {
    description: String,
    state: Mutex<FutureState<T>>,
}

impl<T> DeferredFuture<T> {
    pub fn new(description: impl Into<String>, receiver: oneshot::Receiver<T>) -> Self {
        Self {
            description: description.into(),
            state: Mutex::new(FutureState::Pending(receiver)),
        }
    }

    /// A connected sender and deferred.
    pub fn channel(description: impl Into<String>) -> (oneshot::Sender<T>, Self) {
        let (sender, receiver) = oneshot::channel();
        (sender, Self::new(description, receiver))
    }
}

#[async_trait]
impl<T> Deferred<T> for DeferredFuture<T>
where
    T: Clone + Send + 'static,
{
    async fn get(&self) -> Result<T, DeferredError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let received = match &mut *state {
            FutureState::Pending(receiver) => receiver.try_recv(),
            FutureState::Ready(value) => return Ok(value.clone()),
            FutureState::Abandoned => {
                return Err(DeferredError::permanently(self.description.clone()))
            }
        };

        match received {
            Ok(value) => {
                *state = FutureState::Ready(value.clone());
                Ok(value)
            }
            Err(TryRecvError::Empty) => Err(DeferredError::temporarily(self.description.clone())),
            Err(TryRecvError::Closed) => {
                *state = FutureState::Abandoned;
                Err(DeferredError::permanently(self.description.clone()).with_cause("sender dropped"))
            }
        }
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// A fresh TCP connection to an address.
#[derive(Debug, Clone, Copy)]
pub struct DeferredConnection {
    address: SocketAddr,
}

impl DeferredConnection {
    pub fn to(address: SocketAddr) -> Self {
        Self { address }
    }
}

#[async_trait]
impl Deferred<TcpStream> for DeferredConnection {
    async fn get(&self) -> Result<TcpStream, DeferredError> {
        TcpStream::connect(self.address)
            .await
            .map_err(|e| DeferredError::from_io(self.describe(), e))
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }
}
