//! Pre-configured option sets.

use harness_core::options::OptionsByType;
use harness_core::retry::RetryFrequency;
use harness_core::timing::within;
use harness_runtime::console::Console;
use harness_runtime::options::{Argument, Executable, LaunchLogging};
use std::time::Duration;

/// Polling interval used by [`fast_retry`].
pub const FAST_POLL: Duration = Duration::from_millis(10);

/// Retry options that poll every 10ms for at most `timeout`.
#[must_use]
pub fn fast_retry(timeout: Duration) -> OptionsByType {
    harness_core::options![within(timeout), RetryFrequency::every(FAST_POLL)]
}

/// Options running `script` with `/bin/sh -c`, capturing its output.
///
/// Returns the options and the capturing console, so output can be read
/// after the launch.
#[cfg(unix)]
#[must_use]
pub fn shell(script: &str) -> (OptionsByType, Console) {
    let console = Console::capturing();
    let options = harness_core::options![
        Executable::named("/bin/sh"),
        Argument::of("-c"),
        Argument::of(script),
        console.clone(),
        LaunchLogging::disabled(),
    ];
    (options, console)
}
