use std::time::Duration;

use thiserror::Error;

use crate::CommandLine;

/// Why an external command did not succeed.
///
/// The diagnostic text is opaque and meant to be shown to the operator as-is.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CommandFailure {
    /// The command could not be spawned or exited unsuccessfully.
    #[error("Failed to run \"{command}\": {diagnostic} ({})", exit_label(.exit_code))]
    Failed {
        /// The command that failed.
        command: CommandLine,

        /// Captured standard error, or the spawn error.
        diagnostic: String,

        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
    },

    /// The command was killed after running past its timeout.
    #[error("Timeout exceeded while running \"{command}\"")]
    TimedOut {
        /// The command that timed out.
        command: CommandLine,

        /// The timeout that was exceeded.
        timeout: Duration,
    },
}

impl CommandFailure {
    /// Whether the command timed out.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

fn exit_label(exit_code: &Option<i32>) -> String {
    exit_code.map_or_else(|| "no exit code".to_string(), |code| code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_message() {
        let failure = CommandFailure::Failed {
            command: CommandLine::new("snap").args(["install", "lxd"]),
            diagnostic: "error: cannot install".to_string(),
            exit_code: Some(1),
        };

        assert_eq!(
            failure.to_string(),
            "Failed to run \"snap install lxd\": error: cannot install (1)"
        );
    }

    #[test]
    fn test_timeout_message() {
        let failure = CommandFailure::TimedOut {
            command: CommandLine::new("microcloud").args(["init", "--auto"]),
            timeout: Duration::from_secs(600),
        };

        assert!(failure.is_timeout());
        assert_eq!(
            failure.to_string(),
            "Timeout exceeded while running \"microcloud init --auto\""
        );
    }
}
