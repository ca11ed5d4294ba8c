//! # Harness Test Utilities
//!
//! Mocks and fixtures for testing the harness crates without spawning real
//! processes.
//!
//! ## Modules
//!
//! - `mock_platform` - Spy platform and process counting launches and
//!   terminations
//! - `mock_deferred` - Deferred values following a scripted sequence of
//!   outcomes
//! - `recording` - Profiles, listeners and matchers that record every call
//! - `fixtures` - Option sets for fast retry loops and shell commands
//!
//! ## Usage
//!
//! ```rust,ignore
//! use harness_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let platform = SpyPlatform::builder().fail_close().build();
//!     let log = EventLog::default();
//!
//!     let application: SimpleApplication = launch(
//!         platform.clone(),
//!         &Simple,
//!         options![RecordingProfile::<1>::new(&log)],
//!     )
//!     .await
//!     .unwrap();
//!
//!     assert!(application.close().await.is_err());
//!     assert_eq!(platform.process().unwrap().close_calls(), 1);
//! }
//! ```

pub mod fixtures;
pub mod mock_deferred;
pub mod mock_platform;
pub mod recording;

pub use fixtures::*;
pub use mock_deferred::*;
pub use mock_platform::*;
pub use recording::*;
