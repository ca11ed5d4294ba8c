//! Launching applications on platforms and managing their lifecycle.
//!
//! [`launch`] is the single entry point: it merges platform and caller
//! options, runs the [`MetaClass`] and [`Profile`] hooks, asks the
//! [`Platform`] to realize the process and hands back a typed
//! [`Application`].

#![warn(clippy::pedantic)]

/// Module for application handles and lifecycle
pub mod application;

/// Module for process output handling
pub mod console;

/// Module for runtime error types
pub mod error;

/// Module for Java applications and remote debugging
pub mod java;

/// Module for launch orchestration
pub mod launcher;

/// Module for the local process platform
pub mod local;

/// Module for process launch options
pub mod options;

/// Module for the platform contract
pub mod platform;

/// Module for lifecycle profiles
pub mod profile;

/// Module for remote execution channels
pub mod remote;

/// Module for the graceful shutdown profile
pub mod shutdown;

pub use application::{
    Application, ApplicationCore, ApplicationListener, ApplicationListeners, ApplicationState,
    MetaClass, Simple, SimpleApplication,
};
pub use console::Console;
pub use error::{LaunchError, ProcessError, RemoteError};
pub use launcher::launch;
pub use local::LocalPlatform;
pub use platform::{ApplicationProcess, Platform};
pub use profile::{Profile, Profiles};
pub use remote::{LoopbackChannel, RemoteCallable, RemoteChannel, RemoteChannelFeature};
