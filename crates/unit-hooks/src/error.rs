use microcloud_command::CommandFailure;
use microcloud_peers::{PeerBagError, UnitName};
use microcloud_unit::HostError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A hook tool failed.
    #[error(transparent)]
    Command(#[from] CommandFailure),

    /// Hook tool output could not be parsed.
    #[error("failed to parse {0} output: {1}")]
    Parse(&'static str, #[source] serde_json::Error),

    /// Leadership moved away before an application write.
    #[error("{0} is no longer the leader")]
    NotLeader(UnitName),
}

impl HostError for Error {}

impl PeerBagError for Error {}
