use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle and peer relation events delivered by the host.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Event {
    /// The unit is being installed.
    Install,

    /// The unit (re)started, e.g. after a reboot.
    Start,

    /// The desired configuration may have changed.
    ConfigChanged,

    /// The peer relation was created.
    ClusterRelationCreated,

    /// A peer joined the relation.
    ClusterRelationJoined,

    /// A peer changed its relation data.
    ClusterRelationChanged,

    /// A peer departed the relation.
    ClusterRelationDeparted,

    /// This unit may have become the leader.
    LeaderElected,

    /// Periodic status check.
    UpdateStatus,
}

impl Event {
    /// All events, in the order the host normally delivers them first.
    pub const ALL: [Self; 9] = [
        Self::Install,
        Self::ConfigChanged,
        Self::Start,
        Self::ClusterRelationCreated,
        Self::ClusterRelationJoined,
        Self::ClusterRelationChanged,
        Self::ClusterRelationDeparted,
        Self::LeaderElected,
        Self::UpdateStatus,
    ];

    /// The hook name the host uses for this event.
    #[must_use]
    pub const fn hook_name(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Start => "start",
            Self::ConfigChanged => "config-changed",
            Self::ClusterRelationCreated => "cluster-relation-created",
            Self::ClusterRelationJoined => "cluster-relation-joined",
            Self::ClusterRelationChanged => "cluster-relation-changed",
            Self::ClusterRelationDeparted => "cluster-relation-departed",
            Self::LeaderElected => "leader-elected",
            Self::UpdateStatus => "update-status",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hook_name())
    }
}

/// Returned when a hook name does not map to a handled event.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown hook: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for Event {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.hook_name() == s)
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}

/// How a handler finished.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The event is resolved.
    Completed,

    /// The host should redeliver the event later.
    Deferred,
}
