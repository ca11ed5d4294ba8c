//! Where the output of a launched process goes.

use harness_core::options::Opt;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One of the two output streams of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// A line a process wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub stream: OutputStream,
    pub line: String,
}

/// Lines captured in memory by [`Console::Capturing`].
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    lines: Arc<Mutex<Vec<ConsoleLine>>>,
}

impl CapturedOutput {
    fn push(&self, line: ConsoleLine) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }

    pub fn lines(&self) -> Vec<ConsoleLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stdout(&self) -> Vec<String> {
        self.of(OutputStream::Stdout)
    }

    pub fn stderr(&self) -> Vec<String> {
        self.of(OutputStream::Stderr)
    }

    fn of(&self, stream: OutputStream) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|line| line.stream == stream)
            .map(|line| line.line.clone())
            .collect()
    }
}

/// Option choosing where process output goes. Defaults to [`Console::System`].
#[derive(Debug, Clone, Default)]
pub enum Console {
    /// Forward each line to tracing: stdout at info, stderr at warn.
    #[default]
    System,
    /// Discard output.
    Null,
    /// Keep output in memory.
    Capturing(CapturedOutput),
}

impl Console {
    pub fn system() -> Self {
        Self::System
    }

    pub fn null() -> Self {
        Self::Null
    }

    pub fn capturing() -> Self {
        Self::Capturing(CapturedOutput::default())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The captured output, for a capturing console.
    pub fn captured(&self) -> Option<&CapturedOutput> {
        match self {
            Self::Capturing(output) => Some(output),
            _ => None,
        }
    }

    /// Drain `reader` line by line into this console on a background task.
    pub fn forward<R>(
        &self,
        application: &str,
        pid: Option<u32>,
        stream: OutputStream,
        reader: R,
    ) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let console = self.clone();
        let application = application.to_string();

        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => console.write(&application, pid, stream, line),
                    Ok(None) => break,
                    Err(error) => {
                        warn!(
                            target: "harness.runtime.console",
                            application = %application,
                            stream = %stream,
                            error = %error,
                            "Failed to read process output"
                        );
                        break;
                    }
                }
            }
            debug!(
                target: "harness.runtime.console",
                application = %application,
                stream = %stream,
                "Process output closed"
            );
        })
    }

    fn write(&self, application: &str, pid: Option<u32>, stream: OutputStream, line: String) {
        match self {
            Self::System => match stream {
                OutputStream::Stdout => {
                    info!(target: "harness.runtime.console", application, pid, "{line}");
                }
                OutputStream::Stderr => {
                    warn!(target: "harness.runtime.console", application, pid, "{line}");
                }
            },
            Self::Null => {}
            Self::Capturing(output) => output.push(ConsoleLine { stream, line }),
        }
    }
}

impl Opt for Console {
    fn default_option() -> Option<Self> {
        Some(Self::System)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capturing_console_keeps_lines_per_stream() {
        let console = Console::capturing();

        console
            .forward("app", Some(1), OutputStream::Stdout, &b"one\ntwo\n"[..])
            .await
            .unwrap();
        console
            .forward("app", Some(1), OutputStream::Stderr, &b"oops"[..])
            .await
            .unwrap();

        let captured = console.captured().unwrap();
        assert_eq!(captured.stdout(), vec!["one", "two"]);
        assert_eq!(captured.stderr(), vec!["oops"]);
        assert_eq!(captured.lines().len(), 3);
    }

    #[tokio::test]
    async fn test_null_console_discards() {
        let console = Console::null();

        console
            .forward("app", None, OutputStream::Stdout, &b"ignored\n"[..])
            .await
            .unwrap();

        assert!(console.captured().is_none());
        assert!(console.is_null());
    }
}
