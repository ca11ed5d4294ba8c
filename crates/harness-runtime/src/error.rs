//! Runtime error types.

use harness_core::error::BoxError;
use std::time::Duration;
use thiserror::Error;

/// Failure while launching an application.
///
/// Any failure raised after the underlying process exists is reported only
/// after that process has been closed.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// A required option was not supplied.
    #[error("Missing required option: {0}")]
    MissingOption(&'static str),

    /// A profile rejected the launch.
    #[error("Profile {profile} failed during launch")]
    Profile {
        profile: String,
        #[source]
        source: BoxError,
    },

    /// The platform could not start the process.
    #[error("Failed to spawn {executable}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while waiting for or terminating a process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process was still running when the wait ended.
    #[error("Process did not exit within {0:?}")]
    TimedOut(Duration),

    /// The process could not be terminated.
    #[error("Failed to terminate process: {0}")]
    Terminate(String),

    /// The exit status was lost.
    #[error("Process exit status is unavailable")]
    Lost,
}

/// Failure while submitting work over a remote channel.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The application has no remote channel attached.
    #[error("No remote channel is available")]
    NoChannel,

    /// The channel was closed before or during the call.
    #[error("Remote channel is closed")]
    ChannelClosed,

    /// Nothing on the remote side handles this callable.
    #[error("No remote handler for {0}")]
    UnknownCallable(String),

    /// The remote side ran the callable and it failed.
    #[error("Remote execution of {callable} failed: {message}")]
    Remote { callable: String, message: String },

    /// A request or response could not be encoded or decoded.
    #[error("Remote payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RemoteError {
    /// Whether retrying the same call can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::NoChannel | Self::ChannelClosed | Self::UnknownCallable(_) | Self::Serialization(_)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_error_keeps_profile_cause() {
        let error = LaunchError::Profile {
            profile: "Debugging".to_string(),
            source: "no free port".into(),
        };

        assert_eq!(error.to_string(), "Profile Debugging failed during launch");
        let source = std::error::Error::source(&error).unwrap();
        assert_eq!(source.to_string(), "no free port");
    }

    #[test]
    fn test_remote_error_classification() {
        assert!(RemoteError::ChannelClosed.is_permanent());
        assert!(RemoteError::UnknownCallable("x".to_string()).is_permanent());
        assert!(!RemoteError::Remote {
            callable: "x".to_string(),
            message: "busy".to_string(),
        }
        .is_permanent());
    }
}
