//! Spy platform and process.
//!
//! [`SpyPlatform`] realizes [`SpyProcess`]es instead of real children and
//! records what it was asked to do, so lifecycle tests can assert on the
//! number of launches and terminations.
//!
//! # Example
//!
//! ```rust,ignore
//! use harness_test_utils::SpyPlatform;
//!
//! let platform = SpyPlatform::builder()
//!     .name("spy-1")
//!     .fail_close()
//!     .build();
//!
//! // launch on `platform`, then:
//! assert_eq!(platform.realize_calls(), 1);
//! ```

use async_trait::async_trait;
use harness_core::options::OptionsByType;
use harness_runtime::error::{LaunchError, ProcessError};
use harness_runtime::platform::{ApplicationProcess, Platform, SIGNALLED_EXIT_VALUE};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

static NEXT_PID: AtomicU32 = AtomicU32::new(1000);

// ============================================================================
// SpyProcess
// ============================================================================

/// A process that only exits when told to, or when closed.
#[derive(Debug)]
pub struct SpyProcess {
    pid: u32,
    fail_close: bool,
    close_calls: AtomicUsize,
    exit: watch::Sender<Option<i32>>,
}

impl SpyProcess {
    /// A running process. Closing it fails when `fail_close` is set.
    #[must_use]
    pub fn new(fail_close: bool) -> Self {
        let (exit, _) = watch::channel(None);
        Self {
            pid: NEXT_PID.fetch_add(1, Ordering::SeqCst),
            fail_close,
            close_calls: AtomicUsize::new(0),
            exit,
        }
    }

    /// Make the process exit with `exit_value`, as if on its own.
    pub fn exit(&self, exit_value: i32) {
        self.exit.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(exit_value);
            true
        });
    }

    /// Number of times [`ApplicationProcess::close`] was called.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }
}

#[async_trait]
impl ApplicationProcess for SpyProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn wait_for(&self, timeout: Duration) -> Result<i32, ProcessError> {
        let mut exit = self.exit.subscribe();
        let outcome = tokio::time::timeout(timeout, exit.wait_for(Option::is_some)).await;
        match outcome {
            Ok(Ok(exit_value)) => (*exit_value).ok_or(ProcessError::Lost),
            Ok(Err(_)) => Err(ProcessError::Lost),
            Err(_) => Err(ProcessError::TimedOut(timeout)),
        }
    }

    fn exit_value(&self) -> Option<i32> {
        *self.exit.borrow()
    }

    async fn close(&self) -> Result<(), ProcessError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(ProcessError::Terminate("spy process refused to die".to_string()));
        }
        self.exit(SIGNALLED_EXIT_VALUE);
        Ok(())
    }
}

// ============================================================================
// SpyPlatform
// ============================================================================

/// A platform that hands out [`SpyProcess`]es.
#[derive(Debug)]
pub struct SpyPlatform {
    name: String,
    address: IpAddr,
    options: OptionsByType,
    fail_realize: bool,
    fail_close: bool,
    realize_calls: AtomicUsize,
    realized: Mutex<Vec<(Arc<SpyProcess>, OptionsByType)>>,
}

impl SpyPlatform {
    /// Create a new `SpyPlatform` builder.
    #[must_use]
    pub fn builder() -> SpyPlatformBuilder {
        SpyPlatformBuilder::default()
    }

    /// A spy platform with default behaviour.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    #[must_use]
    pub fn realize_calls(&self) -> usize {
        self.realize_calls.load(Ordering::SeqCst)
    }

    /// The most recently realized process.
    #[must_use]
    pub fn process(&self) -> Option<Arc<SpyProcess>> {
        self.realized
            .lock()
            .unwrap()
            .last()
            .map(|(process, _)| Arc::clone(process))
    }

    /// The options the most recent process was realized with.
    #[must_use]
    pub fn realized_options(&self) -> Option<OptionsByType> {
        self.realized
            .lock()
            .unwrap()
            .last()
            .map(|(_, options)| options.clone())
    }
}

#[async_trait]
impl Platform for SpyPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn address(&self) -> IpAddr {
        self.address
    }

    fn options(&self) -> OptionsByType {
        self.options.clone()
    }

    async fn realize(&self, options: &OptionsByType) -> Result<Arc<dyn ApplicationProcess>, LaunchError> {
        self.realize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_realize {
            return Err(LaunchError::Spawn {
                executable: "spy".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "spy platform refused to launch"),
            });
        }

        let process = Arc::new(SpyProcess::new(self.fail_close));
        self.realized
            .lock()
            .unwrap()
            .push((Arc::clone(&process), options.clone()));
        Ok(process)
    }
}

/// Builder for [`SpyPlatform`] configuration.
#[derive(Debug, Default)]
pub struct SpyPlatformBuilder {
    name: Option<String>,
    address: Option<IpAddr>,
    options: OptionsByType,
    fail_realize: bool,
    fail_close: bool,
}

impl SpyPlatformBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Address the platform reports. Defaults to loopback.
    #[must_use]
    pub fn address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }

    /// Options every launch on the platform starts from.
    #[must_use]
    pub fn options(mut self, options: OptionsByType) -> Self {
        self.options = options;
        self
    }

    /// Make every launch fail when realizing the process.
    #[must_use]
    pub fn fail_realize(mut self) -> Self {
        self.fail_realize = true;
        self
    }

    /// Make every realized process refuse to close.
    #[must_use]
    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<SpyPlatform> {
        Arc::new(SpyPlatform {
            name: self.name.unwrap_or_else(|| "spy".to_string()),
            address: self.address.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            options: self.options,
            fail_realize: self.fail_realize,
            fail_close: self.fail_close,
            realize_calls: AtomicUsize::new(0),
            realized: Mutex::new(Vec::new()),
        })
    }
}
