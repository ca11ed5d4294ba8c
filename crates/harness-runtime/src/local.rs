//! The platform that runs applications as child processes of this one.

use async_trait::async_trait;
use harness_core::options::OptionsByType;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::console::{Console, OutputStream};
use crate::error::{LaunchError, ProcessError};
use crate::options::{Arguments, DisplayName, EnvironmentSource, EnvironmentVariables, Executable, WorkingDirectory};
use crate::platform::{ApplicationProcess, Platform, SIGNALLED_EXIT_VALUE};

/// Name of the default local platform.
pub const LOCAL_PLATFORM_NAME: &str = "local";

/// How long [`LocalProcess::close`] waits for a killed child to be reaped.
pub const KILL_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// LocalPlatform
// ============================================================================

/// Runs applications on this machine.
#[derive(Debug, Clone)]
pub struct LocalPlatform {
    name: String,
    address: IpAddr,
    options: OptionsByType,
    environment: Vec<(String, String)>,
}

impl LocalPlatform {
    pub fn new() -> Self {
        Self {
            name: LOCAL_PLATFORM_NAME.to_string(),
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            options: OptionsByType::empty(),
            environment: Vec::new(),
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The address reported for this machine. Defaults to loopback.
    #[must_use]
    pub fn at_address(mut self, address: IpAddr) -> Self {
        self.address = address;
        self
    }

    /// Options every launch on this platform starts from.
    #[must_use]
    pub fn with_options(mut self, options: OptionsByType) -> Self {
        self.options = options;
        self
    }

    /// The platform's default environment, used by
    /// [`EnvironmentSource::TargetPlatform`].
    #[must_use]
    pub fn with_environment<I, K, V>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment = variables
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    fn command(&self, executable: &Executable, options: &OptionsByType) -> Command {
        let mut command = Command::new(executable.name());

        if let Some(arguments) = options.find::<Arguments>() {
            command.args(arguments.values());
        }
        if let Some(directory) = options.resolve::<WorkingDirectory>() {
            command.current_dir(directory.path());
        }

        if let Some(environment) = options.find::<EnvironmentVariables>() {
            match environment.source() {
                EnvironmentSource::ThisApplication => {}
                EnvironmentSource::Custom => {
                    command.env_clear();
                }
                EnvironmentSource::TargetPlatform => {
                    command.env_clear();
                    command.envs(self.environment.iter().map(|(k, v)| (k, v)));
                }
            }
            for variable in environment.variables() {
                match variable.value() {
                    Some(value) => command.env(variable.name(), value),
                    None => command.env_remove(variable.name()),
                };
            }
        }

        command
    }
}

impl Default for LocalPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for LocalPlatform {
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
        let executable = options
            .find::<Executable>()
            .ok_or(LaunchError::MissingOption("Executable"))?;
        let console = options.resolve::<Console>().map_or_else(Console::system, |c| c.as_ref().clone());
        let name = options
            .find::<DisplayName>()
            .map_or_else(|| executable.short_name().to_string(), |n| n.name().to_string());

        let output = || if console.is_null() { Stdio::null() } else { Stdio::piped() };

        let mut child = self
            .command(&executable, options)
            .stdin(Stdio::null())
            .stdout(output())
            .stderr(output())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                executable: executable.name().to_string(),
                source,
            })?;

        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            console.forward(&name, pid, OutputStream::Stdout, stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            console.forward(&name, pid, OutputStream::Stderr, stderr);
        }

        debug!(
            target: "harness.runtime.local",
            application = %name,
            pid,
            "Spawned local process"
        );
        Ok(Arc::new(LocalProcess::spawned(child)))
    }
}

// ============================================================================
// LocalProcess
// ============================================================================

/// A child process, reaped by a background task that publishes its exit
/// value.
pub struct LocalProcess {
    pid: Option<u32>,
    kill: CancellationToken,
    exit: watch::Receiver<Option<i32>>,
}

impl LocalProcess {
    /// Take ownership of `child`. Must be called within a tokio runtime.
    pub fn spawned(mut child: Child) -> Self {
        let pid = child.id();
        let kill = CancellationToken::new();
        let (publish, exit) = watch::channel(None);

        let killed = kill.clone();
        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                () = killed.cancelled() => None,
            };
            let status = match exited {
                Some(status) => status,
                None => {
                    if let Err(error) = child.start_kill() {
                        debug!(target: "harness.runtime.local", pid, error = %error, "Kill not delivered");
                    }
                    child.wait().await
                }
            };
            let exit_value = match status {
                Ok(status) => exit_value_of(status),
                Err(error) => {
                    warn!(target: "harness.runtime.local", pid, error = %error, "Failed to reap process");
                    SIGNALLED_EXIT_VALUE
                }
            };
            publish.send_replace(Some(exit_value));
        });

        Self { pid, kill, exit }
    }
}

fn exit_value_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(SIGNALLED_EXIT_VALUE)
}

#[async_trait]
impl ApplicationProcess for LocalProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    async fn wait_for(&self, timeout: Duration) -> Result<i32, ProcessError> {
        let mut exit = self.exit.clone();
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
        self.kill.cancel();
        match self.wait_for(KILL_TIMEOUT).await {
            Ok(_) => Ok(()),
            Err(ProcessError::TimedOut(waited)) => Err(ProcessError::Terminate(format!(
                "process {:?} still running {waited:?} after kill",
                self.pid
            ))),
            Err(error) => Err(error),
        }
    }
}

impl fmt::Debug for LocalProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalProcess")
            .field("pid", &self.pid)
            .field("exit_value", &self.exit_value())
            .finish()
    }
}

impl Drop for LocalProcess {
    fn drop(&mut self) {
        self.kill.cancel();
    }
}
