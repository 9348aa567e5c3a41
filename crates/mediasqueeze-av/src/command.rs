//! Builder for executing external tool commands with timeout and cancellation.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Default command timeout: 5 minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// The child is killed if the timeout elapses, if the cancellation token is
/// tripped, or if the future is dropped.
///
/// # Example
///
/// ```no_run
/// use mediasqueeze_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> mediasqueeze_av::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("jpegoptim"))
///     .arg("--size=4999")
///     .arg("/path/to/photo.jpg")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
    cancel: Option<CancellationToken>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            cancel: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(s.as_ref().to_os_string());
        self
    }

    /// Append multiple arguments.
    pub fn args<I, S>(&mut self, iter: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(iter.into_iter().map(|s| s.as_ref().to_os_string()));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Kill the child when `token` is cancelled.
    pub fn cancel_on(&mut self, token: CancellationToken) -> &mut Self {
        self.cancel = Some(token);
        self
    }

    /// Arguments added so far.
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - [`Error::ToolNotFound`] if the program does not exist.
    /// - [`Error::Timeout`] if the process outlives the timeout.
    /// - [`Error::Cancelled`] if the cancellation token fires first.
    /// - [`Error::ToolFailed`] if the process exits with a non-zero status
    ///   (message includes stderr) or cannot be spawned.
    pub async fn execute(&self) -> Result<ToolOutput> {
        let tool = self.tool_name();

        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(Error::Cancelled { tool });
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Running {} {:?}", tool, self.args);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(&tool)
            } else {
                Error::tool_failed(&tool, format!("failed to spawn: {e}"))
            }
        })?;

        let wait = tokio::time::timeout(self.timeout, child.wait_with_output());
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        // Dropping `wait` drops the child, which kills it.
        let result = tokio::select! {
            result = wait => result,
            _ = cancelled => {
                tracing::debug!("{} cancelled", tool);
                return Err(Error::Cancelled { tool });
            }
        };

        match result {
            Ok(Ok(output)) => {
                let tool_output = ToolOutput {
                    status: output.status,
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if !output.status.success() {
                    return Err(Error::tool_failed(
                        tool,
                        format!(
                            "exited with status {}: {}",
                            output.status,
                            tool_output.stderr.trim()
                        ),
                    ));
                }

                Ok(tool_output)
            }
            Ok(Err(e)) => Err(Error::tool_failed(
                tool,
                format!("I/O error waiting for process: {e}"),
            )),
            Err(_elapsed) => Err(Error::Timeout {
                tool,
                after: self.timeout,
            }),
        }
    }
}
