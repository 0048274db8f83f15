use std::fmt;

use microcloud_state::PersistentState;

/// Where a unit is in the bootstrap lifecycle. Only moves forward.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum LifecyclePhase {
    /// Local install has not finished.
    Uninitialized,

    /// Readiness is published; waiting for quorum or for the cluster record.
    AwaitingQuorum,

    /// Cluster init is running on this unit.
    Initializing,

    /// The cluster exists.
    Initialized,
}

impl LifecyclePhase {
    /// Derives the settled phase from persisted state.
    ///
    /// Never returns [`Self::Initializing`], which only lasts while the
    /// init command runs.
    #[must_use]
    pub const fn of(state: &PersistentState) -> Self {
        if state.microcloud_initialized {
            Self::Initialized
        } else if state.ready_to_bootstrap {
            Self::AwaitingQuorum
        } else {
            Self::Uninitialized
        }
    }

    /// Kebab-case name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::AwaitingQuorum => "awaiting-quorum",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
