//! Remote execution channels.
//!
//! A [`RemoteChannel`] carries named, JSON encoded requests to a running
//! application and streams events back. [`RemoteCallable`] and
//! [`RemoteEvent`] add the typed layer on top. [`LoopbackChannel`] runs the
//! handlers in-process, which is what tests and embedded applications use.

use async_trait::async_trait;
use harness_core::deferred::{Deferred, DeferredError};
use harness_core::extensible::{Extensible, Feature};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RemoteError;

/// Capacity of the event broadcast buffer per channel.
pub const EVENT_CAPACITY: usize = 64;

// ============================================================================
// Typed messages
// ============================================================================

/// A unit of work that can run on the other side of a channel.
pub trait RemoteCallable: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name the remote side registers its handler under.
    const NAME: &'static str;

    type Output: Serialize + DeserializeOwned + Send + 'static;
}

/// A notification raised by either side of a channel.
pub trait RemoteEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    const NAME: &'static str;
}

/// A named JSON payload as it travels over a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub name: String,
    pub payload: Value,
}

impl Envelope {
    /// Decode the payload when this envelope carries an `E`.
    pub fn decode<E: RemoteEvent>(&self) -> Option<Result<E, RemoteError>> {
        (self.name == E::NAME)
            .then(|| serde_json::from_value(self.payload.clone()).map_err(RemoteError::from))
    }
}

/// Asks the application to exit with the given code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shutdown {
    pub exit_code: i32,
}

impl RemoteCallable for Shutdown {
    const NAME: &'static str = "harness.shutdown";
    type Output = ();
}

// ============================================================================
// Channel contract
// ============================================================================

/// A bi-directional channel to a running application.
#[async_trait]
pub trait RemoteChannel: Send + Sync + fmt::Debug {
    /// Run the callable registered as `name` and return its encoded output.
    async fn submit_raw(&self, name: &str, payload: Value) -> Result<Value, RemoteError>;

    /// Deliver an event to every subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::ChannelClosed`] once the channel is closed.
    fn raise_raw(&self, envelope: Envelope) -> Result<(), RemoteError>;

    fn subscribe(&self) -> broadcast::Receiver<Envelope>;

    /// Close the channel. In-flight calls fail with
    /// [`RemoteError::ChannelClosed`].
    fn close(&self);

    fn is_open(&self) -> bool;
}

/// Submit a typed callable and decode its output.
///
/// # Errors
///
/// Returns the channel's [`RemoteError`] or a serialization failure.
pub async fn submit<C: RemoteCallable>(
    channel: &dyn RemoteChannel,
    callable: &C,
) -> Result<C::Output, RemoteError> {
    let payload = serde_json::to_value(callable)?;
    let output = channel.submit_raw(C::NAME, payload).await?;
    Ok(serde_json::from_value(output)?)
}

/// Raise a typed event.
///
/// # Errors
///
/// Returns the channel's [`RemoteError`] or a serialization failure.
pub fn raise<E: RemoteEvent>(channel: &dyn RemoteChannel, event: &E) -> Result<(), RemoteError> {
    channel.raise_raw(Envelope {
        name: E::NAME.to_string(),
        payload: serde_json::to_value(event)?,
    })
}

// ============================================================================
// LoopbackChannel
// ============================================================================

type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;
type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// A channel whose "remote" side is a set of in-process handlers.
pub struct LoopbackChannel {
    handlers: RwLock<HashMap<&'static str, Handler>>,
    events: broadcast::Sender<Envelope>,
    closed: CancellationToken,
}

impl LoopbackChannel {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            handlers: RwLock::new(HashMap::new()),
            events,
            closed: CancellationToken::new(),
        }
    }

    /// Register the handler for `C`, replacing any earlier one.
    pub fn handle<C, F, Fut>(&self, handler: F)
    where
        C: RemoteCallable,
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<C::Output>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |payload: Value| -> HandlerFuture {
            match serde_json::from_value::<C>(payload) {
                Ok(request) => {
                    let pending = handler(request);
                    Box::pin(async move {
                        let output = pending.await?;
                        Ok::<Value, anyhow::Error>(serde_json::to_value(output)?)
                    })
                }
                Err(error) => Box::pin(async move { Err::<Value, anyhow::Error>(error.into()) }),
            }
        });

        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(C::NAME, handler);
    }

    /// Builder form of [`handle`](Self::handle).
    #[must_use]
    pub fn with_handler<C, F, Fut>(self, handler: F) -> Self
    where
        C: RemoteCallable,
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<C::Output>> + Send + 'static,
    {
        self.handle(handler);
        self
    }

    fn handler(&self, name: &str) -> Option<Handler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl Default for LoopbackChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoopbackChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("LoopbackChannel")
            .field("handlers", &handlers)
            .field("open", &self.is_open())
            .finish()
    }
}

#[async_trait]
impl RemoteChannel for LoopbackChannel {
    async fn submit_raw(&self, name: &str, payload: Value) -> Result<Value, RemoteError> {
        if self.closed.is_cancelled() {
            return Err(RemoteError::ChannelClosed);
        }
        let handler = self
            .handler(name)
            .ok_or_else(|| RemoteError::UnknownCallable(name.to_string()))?;

        debug!(target: "harness.runtime.remote", callable = name, "Submitting remote callable");

        tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(RemoteError::ChannelClosed),
            result = handler(payload) => result.map_err(|error| RemoteError::Remote {
                callable: name.to_string(),
                message: format!("{error:#}"),
            }),
        }
    }

    fn raise_raw(&self, envelope: Envelope) -> Result<(), RemoteError> {
        if self.closed.is_cancelled() {
            return Err(RemoteError::ChannelClosed);
        }
        // Nobody listening is not an error.
        let _ = self.events.send(envelope);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.events.subscribe()
    }

    fn close(&self) {
        self.closed.cancel();
    }

    fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }
}

// ============================================================================
// Application integration
// ============================================================================

/// Feature attaching a remote channel to an application. The channel is
/// closed when the feature is removed.
#[derive(Debug, Clone)]
pub struct RemoteChannelFeature {
    channel: Arc<dyn RemoteChannel>,
}

impl RemoteChannelFeature {
    pub fn new(channel: Arc<dyn RemoteChannel>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Arc<dyn RemoteChannel> {
        &self.channel
    }
}

impl Feature for RemoteChannelFeature {
    fn on_removing_from(&self, _owner: &dyn Extensible) {
        self.channel.close();
    }
}

/// A deferred value produced by running a callable remotely on each attempt.
///
/// A closed channel or an unknown callable is permanent; a failure of the
/// callable itself is temporary.
pub struct DeferredRemoteExecution<C> {
    channel: Arc<dyn RemoteChannel>,
    callable: C,
}

impl<C: RemoteCallable> DeferredRemoteExecution<C> {
    pub fn new(channel: Arc<dyn RemoteChannel>, callable: C) -> Self {
        Self { channel, callable }
    }
}

#[async_trait]
impl<C: RemoteCallable> Deferred<C::Output> for DeferredRemoteExecution<C> {
    async fn get(&self) -> Result<C::Output, DeferredError> {
        match submit(self.channel.as_ref(), &self.callable).await {
            Ok(output) => Ok(output),
            Err(error) if error.is_permanent() => {
                Err(DeferredError::permanently(self.describe()).with_cause(error))
            }
            Err(error) => {
                warn!(
                    target: "harness.runtime.remote",
                    callable = C::NAME,
                    error = %error,
                    "Remote execution failed, will retry"
                );
                Err(DeferredError::temporarily(self.describe()).with_cause(error))
            }
        }
    }

    fn describe(&self) -> String {
        format!("remote({})", C::NAME)
    }
}
