//! Abstract interface for running external commands with a bounded timeout,
//! plus the implementation that spawns real processes.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod command_line;
mod error;

pub use command_line::CommandLine;
pub use error::CommandFailure;

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

/// Timeout applied to install, init and join commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Captured output of a command that exited successfully.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandOutput {
    /// Standard output, lossily decoded.
    pub stdout: String,

    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Output consisting only of the given stdout.
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// Trait for running external commands.
///
/// Success is decided by the exit status alone.
#[async_trait]
pub trait CommandExecutor
where
    Self: Send + Sync + 'static,
{
    /// Runs `command`, giving up after `timeout`.
    async fn run(
        &self,
        command: &CommandLine,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandFailure>;
}

/// Runs commands as child processes of the agent.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    /// Creates a new `SystemExecutor`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn run(
        &self,
        command: &CommandLine,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandFailure> {
        debug!("running \"{command}\" (timeout {}s)", timeout.as_secs());

        // kill_on_drop reaps the child when the timeout drops the wait future.
        let child = Command::new(command.program())
            .args(command.args_slice())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CommandFailure::Failed {
                command: command.clone(),
                diagnostic: e.to_string(),
                exit_code: None,
            })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(CommandFailure::Failed {
                    command: command.clone(),
                    diagnostic: e.to_string(),
                    exit_code: None,
                });
            }
            Err(_) => {
                warn!("\"{command}\" still running after {}s", timeout.as_secs());
                return Err(CommandFailure::TimedOut {
                    command: command.clone(),
                    timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(CommandFailure::Failed {
                command: command.clone(),
                diagnostic: stderr.trim_end().to_string(),
                exit_code: output.status.code(),
            })
        }
    }
}
