use microcloud_state::StateStoreError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
#[error("state store error")]
pub struct Error;

impl StateStoreError for Error {}
