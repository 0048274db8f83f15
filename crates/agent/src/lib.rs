//! Event-driven agent that installs `MicroCloud` on a unit and bootstraps
//! the cluster once every peer is ready.
//!
//! Each event is routed to an idempotent handler. Handlers reconcile the
//! installed snaps with the desired config, publish readiness to the peer
//! bag, and let the leader run cluster init exactly once before every other
//! unit joins. Recoverable failures block the unit and defer the event.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod agent;
mod commands;
mod config;
mod coordinator;
mod error;
mod installer;
mod phase;
mod reconciler;
mod settings;
mod sideload;

pub use agent::Agent;
pub use config::{
    ConfigDelta, DEFAULT_CHANNEL, IMMUTABLE_KEYS, MICROCEPH, MICROOVN, MODE, SNAP_CHANNEL_LXD,
    SNAP_CHANNEL_MICROCEPH, SNAP_CHANNEL_MICROCLOUD, SNAP_CHANNEL_MICROOVN, Subsystem,
    compute_delta, resolve_channel,
};
pub use coordinator::{
    MIN_MEMBERS, MembershipOutcome, Observation, PeerCoordinator, QuorumCheck, Step, WaitReason,
    plan,
};
pub use error::{AgentError, Result};
pub use installer::SnapInstaller;
pub use phase::LifecyclePhase;
pub use reconciler::{ConfigReconciler, Validation, validate};
pub use settings::AgentSettings;
pub use sideload::{
    BINARY_RESOURCE, SNAP_RESOURCE, Sideloader, architecture_aliases, extract_member, is_tarball,
};
