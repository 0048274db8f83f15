//! Abstract interface to the host runtime that drives a unit agent.
//!
//! The host delivers one lifecycle or relation event at a time, supplies the
//! desired configuration, exposes attached resources and displays the unit
//! status to the operator.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod event;
mod status;

pub use config::{ConfigMap, ConfigValue};
pub use event::{Event, Outcome, UnknownEvent};
pub use status::{StatusKind, UnitStatus};

use std::error::Error;
use std::fmt::Debug;
use std::path::PathBuf;

use async_trait::async_trait;

/// Marker trait for `Host` errors
pub trait HostError: Debug + Error + Send + Sync + 'static {}

/// A trait representing the host runtime as seen from inside one handler.
#[async_trait]
pub trait Host
where
    Self: Send + Sync + 'static,
{
    /// The error type for host operations.
    type Error: HostError;

    /// Fetch the desired configuration. A fresh snapshot on every call.
    async fn config(&self) -> Result<ConfigMap, Self::Error>;

    /// The most recently set unit status, if any was set.
    async fn status(&self) -> Result<Option<UnitStatus>, Self::Error>;

    /// Replace the unit status shown to the operator.
    async fn set_status(&self, status: UnitStatus) -> Result<(), Self::Error>;

    /// Path to an attached resource, or `None` if nothing was attached.
    async fn resource(&self, name: &str) -> Result<Option<PathBuf>, Self::Error>;
}
