use microcloud_command::{CommandExecutor, CommandFailure};
use tracing::{debug, info};

use crate::commands;
use crate::config::Subsystem;
use crate::settings::AgentSettings;

/// Installs subsystem snaps on the node.
pub struct SnapInstaller<'a, E> {
    executor: &'a E,
    settings: &'a AgentSettings,
}

impl<'a, E> SnapInstaller<'a, E>
where
    E: CommandExecutor,
{
    /// Creates an installer running commands through `executor`.
    pub const fn new(executor: &'a E, settings: &'a AgentSettings) -> Self {
        Self { executor, settings }
    }

    /// Installs `subsystem` from `channel`, or moves it there if already installed.
    ///
    /// # Errors
    ///
    /// Returns the first command that failed or timed out.
    pub async fn install(&self, subsystem: Subsystem, channel: &str) -> Result<(), CommandFailure> {
        let timeout = self.settings.command_timeout;

        self.executor
            .run(&commands::snap_install(subsystem, channel), timeout)
            .await?;
        self.executor
            .run(&commands::snap_refresh(subsystem, channel), timeout)
            .await?;

        if subsystem == Subsystem::Lxd && self.settings.legacy_lxd_dir.exists() {
            info!(
                "found legacy LXD data in {}, migrating",
                self.settings.legacy_lxd_dir.display()
            );
            self.executor.run(&commands::lxd_migrate(), timeout).await?;
        }

        debug!("{subsystem} is on {channel}");

        Ok(())
    }
}
