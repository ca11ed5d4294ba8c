//! Asking an application to exit before it is terminated.

use anyhow::bail;
use async_trait::async_trait;
use harness_core::extensible::Extensible;
use harness_core::options::{Collectable, Opt, OptionsByType};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::application::ApplicationCore;
use crate::error::ProcessError;
use crate::profile::{Profile, Profiles};
use crate::remote::{RemoteChannelFeature, Shutdown};

/// Grace period used by [`GracefulShutdown::default`].
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Profile that submits [`Shutdown`] over the application's remote channel
/// when it starts closing, then waits a bounded time for the process to exit
/// on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GracefulShutdown {
    exit_code: i32,
    grace_period: Duration,
}

impl GracefulShutdown {
    pub fn within(grace_period: Duration) -> Self {
        Self {
            exit_code: 0,
            grace_period,
        }
    }

    #[must_use]
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::within(DEFAULT_GRACE_PERIOD)
    }
}

impl Opt for GracefulShutdown {
    fn add_into(self, options: &mut OptionsByType) {
        options.collect(self);
    }
}

impl Collectable for GracefulShutdown {
    type Collector = Profiles;
}

#[async_trait]
impl Profile for GracefulShutdown {
    async fn on_closing(
        &self,
        application: &ApplicationCore,
        _options: &OptionsByType,
    ) -> anyhow::Result<()> {
        if !application.has_feature::<RemoteChannelFeature>() {
            debug!(
                target: "harness.runtime.shutdown",
                application = %application.name(),
                "No remote channel, skipping graceful shutdown"
            );
            return Ok(());
        }

        let request = Shutdown {
            exit_code: self.exit_code,
        };
        if let Err(error) = application.submit(&request).await {
            warn!(
                target: "harness.runtime.shutdown",
                application = %application.name(),
                error = %error,
                "Shutdown request was not accepted"
            );
        }

        match application.process().wait_for(self.grace_period).await {
            Ok(exit_value) => {
                info!(
                    target: "harness.runtime.shutdown",
                    application = %application.name(),
                    exit_value,
                    "Application exited gracefully"
                );
                Ok(())
            }
            Err(ProcessError::TimedOut(waited)) => {
                bail!("{} did not exit within {waited:?}", application.name())
            }
            Err(error) => Err(error.into()),
        }
    }
}
