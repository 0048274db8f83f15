use std::collections::BTreeSet;

use microcloud_command::CommandExecutor;
use microcloud_unit::{ConfigMap, Host, UnitStatus};
use tracing::{debug, info};

use crate::config::{ConfigDelta, IMMUTABLE_KEYS, Subsystem};
use crate::error::{AgentError, Result};
use crate::installer::SnapInstaller;
use crate::phase::LifecyclePhase;
use crate::settings::AgentSettings;

/// Verdict on a config delta.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Validation {
    /// The delta may be applied.
    Accepted,

    /// The delta touches a key that can no longer change.
    Rejected {
        /// The offending key.
        key: String,

        /// Why the change is not allowed.
        reason: String,
    },
}

impl Validation {
    /// Converts a rejection into an error.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ValidationRejected`] for a rejected delta.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Accepted => Ok(()),
            Self::Rejected { key, reason } => Err(AgentError::ValidationRejected { key, reason }),
        }
    }
}

/// Checks a delta against the lifecycle phase.
#[must_use]
pub fn validate(delta: &ConfigDelta, phase: LifecyclePhase) -> Validation {
    if phase == LifecyclePhase::Uninitialized {
        return Validation::Accepted;
    }

    IMMUTABLE_KEYS
        .iter()
        .find(|key| delta.contains_key(key))
        .map_or(Validation::Accepted, |key| Validation::Rejected {
            key: (*key).to_string(),
            reason: format!("bootstrap already started (phase {phase})"),
        })
}

/// Brings the node's installed snaps in line with the desired config.
pub struct ConfigReconciler<'a, E> {
    installer: SnapInstaller<'a, E>,
}

impl<'a, E> ConfigReconciler<'a, E>
where
    E: CommandExecutor,
{
    /// Creates a reconciler running commands through `executor`.
    pub const fn new(executor: &'a E, settings: &'a AgentSettings) -> Self {
        Self {
            installer: SnapInstaller::new(executor, settings),
        }
    }

    /// Installs every subsystem affected by `delta`, in dependency order.
    ///
    /// A subsystem's keys are recorded in `applied` as soon as its commands
    /// all succeeded. Keys belonging to no subsystem are recorded once every
    /// install succeeded. Returns the recorded keys.
    ///
    /// # Errors
    ///
    /// Returns the first failed or timed out command. Keys of subsystems
    /// installed before the failure stay recorded.
    pub async fn apply<H>(
        &self,
        host: &H,
        delta: &ConfigDelta,
        desired: &ConfigMap,
        applied: &mut ConfigMap,
    ) -> Result<BTreeSet<String>>
    where
        H: Host,
    {
        let affected: BTreeSet<Subsystem> =
            delta.keys().filter_map(Subsystem::for_key).collect();
        let mut recorded = BTreeSet::new();

        for subsystem in affected {
            if subsystem.enabled(desired) {
                let channel = subsystem.channel(desired);
                info!("installing {subsystem} from {channel}");

                host.set_status(UnitStatus::maintenance(format!(
                    "Installing {subsystem} snap (channel={channel})"
                )))
                .await
                .map_err(AgentError::host)?;

                self.installer.install(subsystem, &channel).await?;
            } else {
                debug!("{subsystem} is disabled, nothing to install");
            }

            for key in subsystem.keys() {
                if let Some(value) = delta.get(key) {
                    applied.insert(key.to_string(), value.clone());
                    recorded.insert(key.to_string());
                }
            }
        }

        for (key, value) in delta.iter() {
            if Subsystem::for_key(key).is_none() {
                applied.insert(key.to_string(), value.clone());
                recorded.insert(key.to_string());
            }
        }

        Ok(recorded)
    }
}
