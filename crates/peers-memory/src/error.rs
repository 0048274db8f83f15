use microcloud_peers::{PeerBagError, UnitName};
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// The unit lost leadership before writing the application map.
    #[error("{0} is not the leader")]
    NotLeader(UnitName),

    /// The unit is not a member of the group.
    #[error("{0} is not a member of the group")]
    UnknownUnit(UnitName),
}

impl PeerBagError for Error {}
