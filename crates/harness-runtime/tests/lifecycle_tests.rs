//! Launch and close lifecycle tests.
//!
//! Uses `SpyPlatform` from harness-test-utils so no real process is started.
//! Profiles and listeners record every hook into a shared `EventLog`, which
//! lets the tests assert on ordering.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use harness_core::extensible::Extensible;
use harness_core::options;
use harness_core::options::{Collectable, Opt, OptionsByType};
use harness_core::timing::within;
use harness_runtime::application::{ApplicationCore, ApplicationListeners};
use harness_runtime::error::{LaunchError, ProcessError, RemoteError};
use harness_runtime::options::DisplayName;
use harness_runtime::platform::{Platform, SIGNALLED_EXIT_VALUE};
use harness_runtime::profile::{Profile, Profiles};
use harness_runtime::remote::{RemoteChannel, Shutdown};
use harness_runtime::{
    launch, Application, ApplicationState, LoopbackChannel, RemoteChannelFeature, Simple,
    SimpleApplication,
};
use harness_test_utils::{EventLog, RecordingListener, RecordingProfile, SpyPlatform, Stage};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

/// Adds `RecordingProfile<2>` from its own `on_launching`.
#[derive(Debug, Clone)]
struct AddsProfile {
    log: EventLog,
}

impl Opt for AddsProfile {
    fn add_into(self, options: &mut OptionsByType) {
        options.collect(self);
    }
}

impl Collectable for AddsProfile {
    type Collector = Profiles;
}

#[async_trait]
impl Profile for AddsProfile {
    fn on_launching(&self, _platform: &dyn Platform, options: &mut OptionsByType) -> anyhow::Result<()> {
        self.log.record("adds:launching");
        options.add(RecordingProfile::<2>::new(&self.log));
        Ok(())
    }
}

/// Never finishes `on_closing`.
#[derive(Debug, Clone)]
struct HangsOnClose;

impl Opt for HangsOnClose {
    fn add_into(self, options: &mut OptionsByType) {
        options.collect(self);
    }
}

impl Collectable for HangsOnClose {
    type Collector = Profiles;
}

#[async_trait]
impl Profile for HangsOnClose {
    async fn on_closing(&self, _application: &ApplicationCore, _options: &OptionsByType) -> anyhow::Result<()> {
        std::future::pending().await
    }
}

/// Test that profiles run in insertion order and listeners run after them.
#[tokio::test]
async fn test_hooks_run_in_order() -> Result<(), anyhow::Error> {
    let log = EventLog::default();
    let platform = SpyPlatform::new();

    let application: SimpleApplication = launch(
        platform.clone(),
        &Simple,
        options![
            RecordingProfile::<1>::new(&log),
            RecordingProfile::<2>::new(&log),
            ApplicationListeners::of(RecordingListener::new(&log)),
        ],
    )
    .await?;

    assert_eq!(application.state(), ApplicationState::Running);
    application.close().await?;
    assert_eq!(application.state(), ApplicationState::Closed);

    assert_eq!(
        log.events(),
        vec![
            "profile-1:launching",
            "profile-2:launching",
            "profile-1:launched:running",
            "profile-2:launched:running",
            "listener:launched",
            "listener:closing",
            "profile-1:closing",
            "profile-2:closing",
            "listener:closed",
        ]
    );

    Ok(())
}

/// Test that the display name defaults and can be overridden.
#[tokio::test]
async fn test_display_name() -> Result<(), anyhow::Error> {
    let platform = SpyPlatform::new();

    let unnamed: SimpleApplication = launch(platform.clone(), &Simple, options![]).await?;
    assert_eq!(unnamed.name(), "application");

    let named: SimpleApplication =
        launch(platform.clone(), &Simple, options![DisplayName::of("storage-1")]).await?;
    assert_eq!(named.name(), "storage-1");
    assert_ne!(unnamed.id(), named.id());

    unnamed.close().await?;
    named.close().await?;
    Ok(())
}

/// Test that platform options are overridden by launch options.
#[tokio::test]
async fn test_platform_options_are_overridden() -> Result<(), anyhow::Error> {
    let platform = SpyPlatform::builder()
        .options(options![DisplayName::of("from-platform")])
        .build();

    let application: SimpleApplication =
        launch(platform.clone(), &Simple, options![DisplayName::of("from-launch")]).await?;

    assert_eq!(application.name(), "from-launch");
    application.close().await?;
    Ok(())
}

/// Test that closing twice terminates the process once.
#[tokio::test]
async fn test_second_close_does_nothing() -> Result<(), anyhow::Error> {
    let log = EventLog::default();
    let platform = SpyPlatform::new();

    let application: SimpleApplication = launch(
        platform.clone(),
        &Simple,
        options![RecordingProfile::<1>::new(&log)],
    )
    .await?;

    application.close().await?;
    application.close().await?;

    let process = platform.process().expect("process was realized");
    assert_eq!(process.close_calls(), 1);
    assert_eq!(application.exit_value(), Some(SIGNALLED_EXIT_VALUE));
    assert_eq!(
        log.events().iter().filter(|e| *e == "profile-1:closing").count(),
        1
    );
    Ok(())
}

/// Test that a failed termination leaves the application running.
#[tokio::test]
async fn test_failed_close_reverts_to_running() -> Result<(), anyhow::Error> {
    let platform = SpyPlatform::builder().fail_close().build();

    let application: SimpleApplication = launch(platform.clone(), &Simple, options![]).await?;

    let result = application.close().await;
    assert!(matches!(result, Err(ProcessError::Terminate(_))));
    assert_eq!(application.state(), ApplicationState::Running);

    // A retry attempts the termination again.
    assert!(application.close().await.is_err());
    assert_eq!(platform.process().expect("realized").close_calls(), 2);
    Ok(())
}

/// Test that an application exiting on its own reports its exit value.
#[tokio::test]
async fn test_exit_value_of_exited_process() -> Result<(), anyhow::Error> {
    let platform = SpyPlatform::new();
    let application: SimpleApplication = launch(platform.clone(), &Simple, options![]).await?;

    assert_eq!(application.exit_value(), None);
    platform.process().expect("realized").exit(7);
    assert_eq!(application.wait_for().await?, 7);
    assert_eq!(application.exit_value(), Some(7));

    application.close().await?;
    Ok(())
}

/// Test that a failing `on_launching` aborts before the process exists.
#[tokio::test]
async fn test_profile_failure_before_realize() {
    let log = EventLog::default();
    let platform = SpyPlatform::new();

    let result: Result<SimpleApplication, _> = launch(
        platform.clone(),
        &Simple,
        options![RecordingProfile::<1>::new(&log).failing_in(Stage::Launching)],
    )
    .await;

    assert!(matches!(result, Err(LaunchError::Profile { .. })));
    assert_eq!(platform.realize_calls(), 0);
}

/// Test that a failing `on_launched` closes the application it launched.
#[tokio::test]
async fn test_profile_failure_after_realize_closes_process() {
    let log = EventLog::default();
    let platform = SpyPlatform::new();

    let result: Result<SimpleApplication, _> = launch(
        platform.clone(),
        &Simple,
        options![
            RecordingProfile::<1>::new(&log).failing_in(Stage::Launched),
            ApplicationListeners::of(RecordingListener::new(&log)),
        ],
    )
    .await;

    match result {
        Err(LaunchError::Profile { profile, .. }) => assert!(profile.contains("RecordingProfile")),
        other => panic!("expected a profile failure, got {:?}", other.map(|a| a.name().to_string())),
    }

    let process = platform.process().expect("process was realized");
    assert_eq!(process.close_calls(), 1);
    assert!(process.has_exited());
    assert!(log.position("listener:launched").is_none());
    assert!(log.position("listener:closed").is_some());
}

/// Test that a platform failing to realize surfaces a spawn error.
#[tokio::test]
async fn test_realize_failure() {
    let platform = SpyPlatform::builder().fail_realize().build();

    let result: Result<SimpleApplication, _> = launch(platform.clone(), &Simple, options![]).await;

    assert!(matches!(result, Err(LaunchError::Spawn { .. })));
    assert_eq!(platform.realize_calls(), 1);
    assert!(platform.process().is_none());
}

/// Test that a profile failing while closing does not stop the close.
#[tokio::test]
async fn test_closing_failure_is_tolerated() -> Result<(), anyhow::Error> {
    let log = EventLog::default();
    let platform = SpyPlatform::new();

    let application: SimpleApplication = launch(
        platform.clone(),
        &Simple,
        options![
            RecordingProfile::<1>::new(&log).failing_in(Stage::Closing),
            RecordingProfile::<2>::new(&log),
        ],
    )
    .await?;

    application.close().await?;

    assert_eq!(application.state(), ApplicationState::Closed);
    assert!(log.position("profile-2:closing").is_some());
    Ok(())
}

/// Test that closing detaches features and closes their remote channel.
#[tokio::test]
async fn test_close_detaches_remote_channel() -> Result<(), anyhow::Error> {
    let platform = SpyPlatform::new();
    let application: SimpleApplication = launch(platform.clone(), &Simple, options![]).await?;

    let channel = Arc::new(LoopbackChannel::new());
    application
        .core()
        .add_feature(RemoteChannelFeature::new(channel.clone()))?;
    assert!(application.core().has_feature::<RemoteChannelFeature>());

    application.close().await?;

    assert!(!channel.is_open());
    assert!(!application.core().has_feature::<RemoteChannelFeature>());
    Ok(())
}

/// Test that submitting without a channel fails permanently.
#[tokio::test]
async fn test_submit_without_channel() -> Result<(), anyhow::Error> {
    let platform = SpyPlatform::new();
    let application: SimpleApplication = launch(platform.clone(), &Simple, options![]).await?;

    let result = application.core().submit(&Shutdown { exit_code: 0 }).await;

    match result {
        Err(error @ RemoteError::NoChannel) => assert!(error.is_permanent()),
        other => panic!("expected NoChannel, got {other:?}"),
    }
    application.close().await?;
    Ok(())
}

/// Test that a profile added during launch gets every hook in order.
#[tokio::test]
async fn test_profile_added_while_launching_gets_every_hook() -> Result<(), anyhow::Error> {
    let log = EventLog::default();
    let platform = SpyPlatform::new();

    let application: SimpleApplication = launch(
        platform.clone(),
        &Simple,
        options![AddsProfile { log: log.clone() }, RecordingProfile::<1>::new(&log)],
    )
    .await?;
    application.close().await?;

    assert_eq!(
        log.events(),
        vec![
            "adds:launching",
            "profile-1:launching",
            "profile-2:launching",
            "profile-1:launched:running",
            "profile-2:launched:running",
            "profile-1:closing",
            "profile-2:closing",
        ]
    );
    Ok(())
}

/// Test that a profile stuck in `on_closing` does not stop termination.
#[tokio::test(start_paused = true)]
async fn test_hung_closing_profile_times_out() -> Result<(), anyhow::Error> {
    let log = EventLog::default();
    let platform = SpyPlatform::new();

    let application: SimpleApplication = launch(
        platform.clone(),
        &Simple,
        options![
            HangsOnClose,
            RecordingProfile::<1>::new(&log),
            within(Duration::from_secs(5)),
        ],
    )
    .await?;

    let started = tokio::time::Instant::now();
    application.close().await?;

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(application.state(), ApplicationState::Closed);
    assert_eq!(application.exit_value(), Some(SIGNALLED_EXIT_VALUE));
    assert!(log.events().contains(&"profile-1:closing".to_string()));

    let process = platform.process().expect("process was realized");
    assert_eq!(process.close_calls(), 1);
    Ok(())
}

/// Test that platforms report their address.
#[tokio::test]
async fn test_platform_address() -> Result<(), anyhow::Error> {
    let platform = SpyPlatform::new();
    assert_eq!(platform.address(), IpAddr::V4(Ipv4Addr::LOCALHOST));

    let address: IpAddr = "10.0.0.7".parse()?;
    let remote = SpyPlatform::builder().address(address).build();

    let application: SimpleApplication = launch(remote.clone(), &Simple, options![]).await?;
    assert_eq!(application.core().platform().address(), address);

    application.close().await?;
    Ok(())
}
