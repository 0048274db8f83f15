//! Error types for the mock host implementation.

use microcloud_unit::HostError;
use thiserror::Error;

/// Error type for the mock host implementation.
#[derive(Clone, Debug, Error)]
#[error("mock host error")]
pub struct Error;

impl HostError for Error {}
