use std::time::Duration;

use microcloud_command::{CommandFailure, CommandLine};
use microcloud_state::BlockReason;
use thiserror::Error;

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while handling an event.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A config change that is not allowed in the current phase.
    #[error("Can't modify {key} after initialization")]
    ValidationRejected {
        /// The offending key.
        key: String,

        /// Why the change is not allowed.
        reason: String,
    },

    /// An external command exited unsuccessfully.
    #[error("Failed to run \"{command}\": {diagnostic} ({})", exit_label(.exit_code))]
    ExternalCommandFailed {
        /// The command that failed.
        command: CommandLine,

        /// Captured diagnostic output.
        diagnostic: String,

        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
    },

    /// An external command ran past its timeout.
    #[error("Timeout exceeded while running \"{command}\"")]
    ExternalCommandTimedOut {
        /// The command that timed out.
        command: CommandLine,

        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// The host runtime failed.
    #[error("host error: {0}")]
    Host(#[source] BoxError),

    /// A sideloaded artifact could not be read or put in place.
    #[error("Failed to sideload MicroCloud: {0}: {1}")]
    SideloadFailed(&'static str, #[source] std::io::Error),

    /// The peer bag failed.
    #[error("peer bag error: {0}")]
    PeerBag(#[source] BoxError),

    /// The state store failed.
    #[error("state store error: {0}")]
    State(#[source] BoxError),
}

impl AgentError {
    pub(crate) fn host<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Host(Box::new(error))
    }

    pub(crate) fn peers<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::PeerBag(Box::new(error))
    }

    pub(crate) fn state<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::State(Box::new(error))
    }

    /// Whether the event should be deferred and retried on redelivery.
    #[must_use]
    pub const fn is_deferrable(&self) -> bool {
        matches!(
            self,
            Self::ExternalCommandFailed { .. }
                | Self::ExternalCommandTimedOut { .. }
                | Self::SideloadFailed(..)
        )
    }

    /// The reason to record alongside a blocked status, if this error blocks.
    #[must_use]
    pub fn block_reason(&self) -> Option<BlockReason> {
        match self {
            Self::ValidationRejected { key, .. } => Some(BlockReason::ImmutableKey(key.clone())),
            Self::ExternalCommandFailed { .. } => Some(BlockReason::CommandFailed),
            Self::ExternalCommandTimedOut { .. } => Some(BlockReason::CommandTimedOut),
            Self::SideloadFailed(..) => Some(BlockReason::SideloadFailed),
            _ => None,
        }
    }
}

impl From<CommandFailure> for AgentError {
    fn from(failure: CommandFailure) -> Self {
        match failure {
            CommandFailure::Failed {
                command,
                diagnostic,
                exit_code,
            } => Self::ExternalCommandFailed {
                command,
                diagnostic,
                exit_code,
            },
            CommandFailure::TimedOut { command, timeout } => {
                Self::ExternalCommandTimedOut { command, timeout }
            }
        }
    }
}

fn exit_label(exit_code: &Option<i32>) -> String {
    exit_code.map_or_else(|| "no exit code".to_string(), |code| code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failure_keeps_kind() {
        let command = CommandLine::new("snap").args(["refresh", "lxd"]);

        let failed = AgentError::from(CommandFailure::Failed {
            command: command.clone(),
            diagnostic: "snap \"lxd\" not installed".to_string(),
            exit_code: Some(1),
        });
        let timed_out = AgentError::from(CommandFailure::TimedOut {
            command,
            timeout: Duration::from_secs(600),
        });

        assert_eq!(
            failed.to_string(),
            "Failed to run \"snap refresh lxd\": snap \"lxd\" not installed (1)"
        );
        assert_eq!(failed.block_reason(), Some(BlockReason::CommandFailed));
        assert!(timed_out.is_deferrable());
        assert_eq!(timed_out.block_reason(), Some(BlockReason::CommandTimedOut));
    }

    #[test]
    fn test_sideload_failure_blocks_and_defers() {
        let error = AgentError::SideloadFailed(
            "failed to copy sideloaded binary",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );

        assert!(error.is_deferrable());
        assert_eq!(error.block_reason(), Some(BlockReason::SideloadFailed));
        assert!(error.to_string().starts_with("Failed to sideload MicroCloud: failed to copy"));
    }

    #[test]
    fn test_rejection_is_not_deferred() {
        let error = AgentError::ValidationRejected {
            key: "mode".to_string(),
            reason: "bootstrap already started".to_string(),
        };

        assert!(!error.is_deferrable());
        assert_eq!(error.to_string(), "Can't modify mode after initialization");
        assert_eq!(
            error.block_reason(),
            Some(BlockReason::ImmutableKey("mode".to_string()))
        );
    }
}
