//! Profiles, listeners and matchers that record every call.

use async_trait::async_trait;
use harness_core::options::{Collectable, Opt, OptionsByType};
use harness_runtime::application::{ApplicationCore, ApplicationListener};
use harness_runtime::platform::Platform;
use harness_runtime::profile::{Profile, Profiles};
use harness_testing::matchers::Matcher;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A shared, ordered log of recorded events.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Index of the first event equal to `event`.
    #[must_use]
    pub fn position(&self, event: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e == event)
    }
}

/// A lifecycle stage a [`RecordingProfile`] can be told to fail in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Launching,
    Launched,
    Closing,
}

/// A profile recording `profile-ID:launching`, `profile-ID:launched:<state>`
/// and `profile-ID:closing`. The `ID` makes distinct profile types, so
/// several can be added to the same options.
#[derive(Debug, Clone)]
pub struct RecordingProfile<const ID: u8> {
    log: EventLog,
    fail_in: Option<Stage>,
}

impl<const ID: u8> RecordingProfile<ID> {
    #[must_use]
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            fail_in: None,
        }
    }

    /// Make the hook for `stage` fail after recording.
    #[must_use]
    pub fn failing_in(mut self, stage: Stage) -> Self {
        self.fail_in = Some(stage);
        self
    }

    fn record(&self, stage: Stage, event: String) -> anyhow::Result<()> {
        self.log.record(event);
        if self.fail_in == Some(stage) {
            anyhow::bail!("profile-{} failed in {:?}", ID, stage);
        }
        Ok(())
    }
}

impl<const ID: u8> Opt for RecordingProfile<ID> {
    fn add_into(self, options: &mut OptionsByType) {
        options.collect(self);
    }
}

impl<const ID: u8> Collectable for RecordingProfile<ID> {
    type Collector = Profiles;
}

#[async_trait]
impl<const ID: u8> Profile for RecordingProfile<ID> {
    fn on_launching(&self, _platform: &dyn Platform, _options: &mut OptionsByType) -> anyhow::Result<()> {
        self.record(Stage::Launching, format!("profile-{}:launching", ID))
    }

    async fn on_launched(&self, application: &ApplicationCore, _options: &OptionsByType) -> anyhow::Result<()> {
        self.record(
            Stage::Launched,
            format!("profile-{}:launched:{}", ID, application.state()),
        )
    }

    async fn on_closing(&self, _application: &ApplicationCore, _options: &OptionsByType) -> anyhow::Result<()> {
        self.record(Stage::Closing, format!("profile-{}:closing", ID))
    }
}

/// A listener recording `listener:launched`, `listener:closing` and
/// `listener:closed`.
#[derive(Debug, Clone)]
pub struct RecordingListener {
    log: EventLog,
}

impl RecordingListener {
    #[must_use]
    pub fn new(log: &EventLog) -> Self {
        Self { log: log.clone() }
    }
}

#[async_trait]
impl ApplicationListener for RecordingListener {
    async fn on_launched(&self, _application: &ApplicationCore) {
        self.log.record("listener:launched");
    }

    async fn on_closing(&self, _application: &ApplicationCore) {
        self.log.record("listener:closing");
    }

    async fn on_closed(&self, _application: &ApplicationCore) {
        self.log.record("listener:closed");
    }
}

/// A matcher counting how often it was evaluated.
pub struct RecordingMatcher<M> {
    inner: M,
    evaluations: Arc<AtomicUsize>,
}

impl<M> RecordingMatcher<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            evaluations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A counter that stays readable after the matcher was moved away.
    #[must_use]
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.evaluations)
    }

    #[must_use]
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }
}

impl<T: ?Sized, M: Matcher<T>> Matcher<T> for RecordingMatcher<M> {
    fn matches(&self, value: &T) -> bool {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        self.inner.matches(value)
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn describe_mismatch(&self, value: &T) -> String {
        self.inner.describe_mismatch(value)
    }
}
