//! Application handles and their lifecycle.
//!
//! ```text
//! Created -> Launching -> Running -> Closing -> Closed
//! ```
//!
//! Every concrete application wraps an [`ApplicationCore`], which owns the
//! process, the resolved options and the feature registry, and implements
//! the close sequence once for all of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harness_core::extensible::{Extensible, Features};
use harness_core::options::{compose_same, Opt, OptionsByType};
use harness_core::timing::Timeout;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LaunchError, ProcessError, RemoteError};
use crate::platform::{ApplicationProcess, Platform};
use crate::profile::Profiles;
use crate::remote::{self, RemoteCallable, RemoteChannelFeature};

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationState {
    Created,
    Launching,
    Running,
    Closing,
    Closed,
}

impl fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Launching => "launching",
            Self::Running => "running",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Listeners
// ============================================================================

/// Observer of application lifecycle events.
#[async_trait]
pub trait ApplicationListener: Send + Sync + fmt::Debug {
    async fn on_launched(&self, _application: &ApplicationCore) {}

    async fn on_closing(&self, _application: &ApplicationCore) {}

    async fn on_closed(&self, _application: &ApplicationCore) {}
}

/// Option carrying the listeners of a launch. Listener lists from merged
/// options are concatenated.
#[derive(Debug, Clone, Default)]
pub struct ApplicationListeners(Vec<Arc<dyn ApplicationListener>>);

impl ApplicationListeners {
    pub fn of(listener: impl ApplicationListener + 'static) -> Self {
        Self(vec![Arc::new(listener)])
    }

    #[must_use]
    pub fn and(&self, listener: impl ApplicationListener + 'static) -> Self {
        let mut listeners = self.0.clone();
        listeners.push(Arc::new(listener));
        Self(listeners)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ApplicationListener>> {
        self.0.iter()
    }

    fn merged(&self, later: &ApplicationListeners) -> ApplicationListeners {
        Self(self.0.iter().chain(later.0.iter()).cloned().collect())
    }
}

impl Opt for ApplicationListeners {
    fn compose(&self, earlier: &dyn Opt) -> Option<Arc<dyn Opt>> {
        compose_same(self, earlier, ApplicationListeners::merged)
    }
}

// ============================================================================
// ApplicationCore
// ============================================================================

/// Per-application state shared by every application type.
pub struct ApplicationCore {
    id: Uuid,
    name: String,
    platform: Arc<dyn Platform>,
    process: Arc<dyn ApplicationProcess>,
    options: OptionsByType,
    features: Features,
    state: RwLock<ApplicationState>,
    launched_at: DateTime<Utc>,
    close_lock: tokio::sync::Mutex<()>,
}

impl ApplicationCore {
    pub fn new(
        name: impl Into<String>,
        platform: Arc<dyn Platform>,
        process: Arc<dyn ApplicationProcess>,
        options: OptionsByType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            platform,
            process,
            options,
            features: Features::new(),
            state: RwLock::new(ApplicationState::Created),
            launched_at: Utc::now(),
            close_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub fn process(&self) -> &Arc<dyn ApplicationProcess> {
        &self.process
    }

    /// The options the application was launched with.
    pub fn options(&self) -> &OptionsByType {
        &self.options
    }

    pub fn launched_at(&self) -> DateTime<Utc> {
        self.launched_at
    }

    pub fn state(&self) -> ApplicationState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, state: ApplicationState) {
        let previous = std::mem::replace(
            &mut *self.state.write().unwrap_or_else(PoisonError::into_inner),
            state,
        );
        debug!(
            target: "harness.runtime.application",
            application = %self.name,
            from = %previous,
            to = %state,
            "Application state changed"
        );
    }

    /// The application's timeout, used to bound waits and closing hooks.
    pub fn timeout(&self) -> Duration {
        self.options
            .resolve::<Timeout>()
            .map_or(Duration::from_secs(60), |timeout| timeout.duration())
    }

    /// Wait for the process to exit within the application's timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::TimedOut`] when the process is still running.
    pub async fn wait_for(&self) -> Result<i32, ProcessError> {
        self.process.wait_for(self.timeout()).await
    }

    pub fn exit_value(&self) -> Option<i32> {
        self.process.exit_value()
    }

    /// Run `callable` through the attached remote channel.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NoChannel`] when no channel is attached, or the
    /// failure of the call itself.
    pub async fn submit<C: RemoteCallable>(&self, callable: &C) -> Result<C::Output, RemoteError> {
        let feature = self
            .features
            .get::<RemoteChannelFeature>()
            .ok_or(RemoteError::NoChannel)?;
        remote::submit(feature.channel().as_ref(), callable).await
    }

    /// Close the application: notify listeners and profiles, terminate the
    /// process, then detach every feature. Closing a closed application does
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns the [`ProcessError`] of a failed forced termination; the
    /// application is then back in [`ApplicationState::Running`].
    pub async fn close(&self) -> Result<(), ProcessError> {
        let _guard = self.close_lock.lock().await;
        if self.state() == ApplicationState::Closed {
            return Ok(());
        }
        let resumed = self.state();
        self.set_state(ApplicationState::Closing);

        let listeners = self.options.find::<ApplicationListeners>();
        if let Some(listeners) = &listeners {
            for listener in listeners.iter() {
                listener.on_closing(self).await;
            }
        }

        let timeout = self.timeout();
        if let Some(profiles) = self.options.find::<Profiles>() {
            for profile in profiles.iter() {
                match tokio::time::timeout(timeout, profile.on_closing(self, &self.options)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => warn!(
                        target: "harness.runtime.application",
                        application = %self.name,
                        profile = profile.name(),
                        error = %error,
                        "Profile failed while closing"
                    ),
                    Err(_) => warn!(
                        target: "harness.runtime.application",
                        application = %self.name,
                        profile = profile.name(),
                        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        "Profile timed out while closing"
                    ),
                }
            }
        }

        if let Err(error) = self.process.close().await {
            warn!(
                target: "harness.runtime.application",
                application = %self.name,
                error = %error,
                "Failed to terminate application process"
            );
            self.set_state(resumed);
            return Err(error);
        }

        match self.process.wait_for(timeout).await {
            Ok(exit_value) => info!(
                target: "harness.runtime.application",
                application = %self.name,
                exit_value,
                "Application closed"
            ),
            Err(error) => warn!(
                target: "harness.runtime.application",
                application = %self.name,
                error = %error,
                "Application process did not report an exit value"
            ),
        }

        if let Some(listeners) = &listeners {
            for listener in listeners.iter() {
                listener.on_closed(self).await;
            }
        }

        self.features.remove_all(self);
        self.set_state(ApplicationState::Closed);
        Ok(())
    }
}

impl Extensible for ApplicationCore {
    fn features(&self) -> &Features {
        &self.features
    }
}

impl fmt::Debug for ApplicationCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("platform", &self.platform.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Application and MetaClass
// ============================================================================

/// A launched application.
#[async_trait]
pub trait Application: Send + Sync + 'static {
    fn core(&self) -> &ApplicationCore;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn id(&self) -> Uuid {
        self.core().id()
    }

    fn state(&self) -> ApplicationState {
        self.core().state()
    }

    fn options(&self) -> &OptionsByType {
        self.core().options()
    }

    fn exit_value(&self) -> Option<i32> {
        self.core().exit_value()
    }

    /// # Errors
    ///
    /// See [`ApplicationCore::wait_for`].
    async fn wait_for(&self) -> Result<i32, ProcessError> {
        self.core().wait_for().await
    }

    /// # Errors
    ///
    /// See [`ApplicationCore::close`].
    async fn close(&self) -> Result<(), ProcessError> {
        self.core().close().await
    }
}

/// The plain application type, for programs with no extra behaviour.
#[derive(Debug)]
pub struct SimpleApplication {
    core: ApplicationCore,
}

impl Application for SimpleApplication {
    fn core(&self) -> &ApplicationCore {
        &self.core
    }
}

/// Describes how to launch one kind of [`Application`].
///
/// Hooks run in this order: [`on_launching`](Self::on_launching) before any
/// profile, [`on_launch`](Self::on_launch) after every profile,
/// [`create`](Self::create) once the process exists, then
/// [`on_launched`](Self::on_launched) before the profiles' own
/// `on_launched`.
#[async_trait]
pub trait MetaClass<A: Application>: Send + Sync {
    /// # Errors
    ///
    /// An error aborts the launch.
    fn on_launching(
        &self,
        _platform: &dyn Platform,
        _options: &mut OptionsByType,
    ) -> Result<(), LaunchError> {
        Ok(())
    }

    /// # Errors
    ///
    /// An error aborts the launch.
    fn on_launch(
        &self,
        _platform: &dyn Platform,
        _options: &mut OptionsByType,
    ) -> Result<(), LaunchError> {
        Ok(())
    }

    /// Build the application around its core.
    ///
    /// # Errors
    ///
    /// An error closes the process and aborts the launch.
    fn create(&self, core: ApplicationCore) -> Result<A, LaunchError>;

    /// # Errors
    ///
    /// An error closes the application and aborts the launch.
    async fn on_launched(&self, _application: &A, _options: &OptionsByType) -> Result<(), LaunchError> {
        Ok(())
    }
}

/// Meta-class for [`SimpleApplication`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Simple;

impl MetaClass<SimpleApplication> for Simple {
    fn create(&self, core: ApplicationCore) -> Result<SimpleApplication, LaunchError> {
        Ok(SimpleApplication { core })
    }
}
