//! Local durable record of a unit's view of the cluster.
//!
//! The state never leaves the node. Peers only learn about each other
//! through the peer bag.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::error::Error;
use std::fmt::Debug;
use std::path::PathBuf;

use async_trait::async_trait;
use microcloud_unit::{ConfigMap, Event};
use serde::{Deserialize, Serialize};

/// Marker trait for `StateStore` errors
pub trait StateStoreError: Debug + Error + Send + Sync + 'static {}

/// Why the unit was last put into blocked status.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "reason", content = "key", rename_all = "kebab-case")]
pub enum BlockReason {
    /// An immutable config key was changed after bootstrap started.
    ImmutableKey(String),

    /// An external command exited unsuccessfully.
    CommandFailed,

    /// An external command ran past its timeout.
    CommandTimedOut,

    /// A sideloaded artifact could not be installed.
    SideloadFailed,
}

/// Everything a unit remembers between events.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct PersistentState {
    /// Config values that were successfully applied.
    pub config: ConfigMap,

    /// Readiness was published to the peer bag after local install.
    pub ready_to_bootstrap: bool,

    /// The cluster is known to be initialized.
    pub microcloud_initialized: bool,

    /// This unit is a member of the initialized cluster.
    pub joined: bool,

    /// The unit runs inside a container.
    pub inside_container: bool,

    /// A reboot is pending before queued changes take effect.
    pub reboot_required: bool,

    /// Sideloaded snap in use, if any.
    pub microcloud_snap_path: Option<PathBuf>,

    /// Sideloaded binary in use, if any.
    pub microcloud_binary_path: Option<PathBuf>,

    /// Reason attached to the current blocked status.
    pub blocked_on: Option<BlockReason>,

    /// Events waiting for redelivery, oldest first.
    pub deferred: Vec<Event>,
}

impl PersistentState {
    /// Queues an event for redelivery. An event is queued at most once.
    pub fn defer(&mut self, event: Event) {
        if !self.deferred.contains(&event) {
            self.deferred.push(event);
        }
    }

    /// Removes and returns all queued events.
    pub fn take_deferred(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.deferred)
    }
}

/// A trait representing durable storage for one unit's `PersistentState`.
#[async_trait]
pub trait StateStore
where
    Self: Send + Sync + 'static,
{
    /// The error type for the store.
    type Error: StateStoreError;

    /// Loads the state, or the default state if nothing was saved yet.
    async fn load(&self) -> Result<PersistentState, Self::Error>;

    /// Durably replaces the saved state.
    async fn save(&self, state: &PersistentState) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    use microcloud_unit::ConfigValue;

    #[test]
    fn test_missing_fields_default() {
        let state: PersistentState =
            serde_json::from_str(r#"{"microcloud_initialized": true}"#).unwrap();

        assert!(state.microcloud_initialized);
        assert!(!state.joined);
        assert!(state.config.is_empty());
        assert!(state.deferred.is_empty());
    }

    #[test]
    fn test_block_reason_encoding() {
        let json =
            serde_json::to_string(&BlockReason::ImmutableKey("mode".to_string())).unwrap();
        assert_eq!(json, r#"{"reason":"immutable-key","key":"mode"}"#);

        let state = PersistentState {
            blocked_on: Some(BlockReason::CommandTimedOut),
            ..PersistentState::default()
        };
        let decoded: PersistentState =
            serde_json::from_str(&serde_json::to_string(&state).unwrap()).unwrap();
        assert_eq!(decoded.blocked_on, Some(BlockReason::CommandTimedOut));
    }

    #[test]
    fn test_defer_deduplicates() {
        let mut state = PersistentState::default();
        state.defer(Event::Install);
        state.defer(Event::ClusterRelationChanged);
        state.defer(Event::Install);

        assert_eq!(
            state.take_deferred(),
            vec![Event::Install, Event::ClusterRelationChanged]
        );
        assert!(state.deferred.is_empty());
    }

    #[test]
    fn test_applied_config_is_kept() {
        let mut state = PersistentState::default();
        state
            .config
            .insert("mode".to_string(), ConfigValue::from("cluster"));

        let json = serde_json::to_string(&state).unwrap();
        let decoded: PersistentState = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.config["mode"], ConfigValue::from("cluster"));
    }
}
