//! Abstract interface for the peer data bag shared by all units of a group.
//!
//! Every unit owns one key/value map that only it may write and every peer
//! may read. The group additionally owns one application-scoped map that
//! only the current leader may write. The bag is eventually consistent and
//! offers no multi-key transactions.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod unit_name;

pub use unit_name::UnitName;

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;

/// Per-unit key set once local installation has finished.
pub const READY_TO_BOOTSTRAP: &str = "ready_to_bootstrap";

/// Group key set by the leader once the cluster is initialized.
pub const MICROCLOUD_INITIALIZED: &str = "microcloud_initialized";

/// String used for a set flag. Absent or any other value means unset.
pub const FLAG_SET: &str = "True";

/// Whether a bag value represents a set flag.
#[must_use]
pub fn is_flag_set(value: Option<&str>) -> bool {
    value == Some(FLAG_SET)
}

/// Marker trait for `PeerBag` errors
pub trait PeerBagError: Debug + Error + Send + Sync + 'static {}

/// Write access to the application-scoped map.
///
/// Only handed out by [`PeerBag::leader`] on the leader unit, so a
/// non-leader has no way of attempting the write.
#[async_trait]
pub trait LeaderHandle
where
    Self: Send + Sync + 'static,
{
    /// The error type for the handle.
    type Error: PeerBagError;

    /// Writes a key in the application-scoped map.
    async fn set_app(&self, key: &str, value: &str) -> Result<(), Self::Error>;
}

/// A trait representing one unit's view of the peer bag.
#[async_trait]
pub trait PeerBag
where
    Self: Send + Sync + 'static,
{
    /// The error type for bag operations.
    type Error: PeerBagError;

    /// Capability to write the application-scoped map.
    type Leader: LeaderHandle<Error = Self::Error>;

    /// The unit this view belongs to.
    fn local_unit(&self) -> &UnitName;

    /// All current members of the group, the local unit included.
    ///
    /// Returns `None` while the peer relation does not exist yet.
    async fn members(&self) -> Result<Option<Vec<UnitName>>, Self::Error>;

    /// Reads a key from a unit's map.
    async fn unit_data(&self, unit: &UnitName, key: &str) -> Result<Option<String>, Self::Error>;

    /// Writes a key in the local unit's map.
    async fn set_local(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Reads a key from the application-scoped map.
    async fn app_data(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Returns the leader capability if the local unit currently leads.
    async fn leader(&self) -> Result<Option<Self::Leader>, Self::Error>;

    /// Reads a flag from a unit's map.
    async fn unit_flag(&self, unit: &UnitName, key: &str) -> Result<bool, Self::Error> {
        Ok(is_flag_set(self.unit_data(unit, key).await?.as_deref()))
    }

    /// Reads a flag from the application-scoped map.
    async fn app_flag(&self, key: &str) -> Result<bool, Self::Error> {
        Ok(is_flag_set(self.app_data(key).await?.as_deref()))
    }

    /// Writes a key in the local unit's map unless it already holds `value`.
    async fn update_local(&self, key: &str, value: &str) -> Result<bool, Self::Error> {
        let unit = self.local_unit().clone();
        if self.unit_data(&unit, key).await?.as_deref() == Some(value) {
            return Ok(false);
        }
        self.set_local(key, value).await?;
        Ok(true)
    }
}
