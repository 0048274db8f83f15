//! Installing `MicroCloud` artifacts attached as resources instead of the
//! store snap.
//!
//! A resource may be the artifact itself or a tarball holding one per
//! architecture. A zero-byte resource reverts to the store version.

use std::fs::File;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use microcloud_command::CommandExecutor;
use microcloud_state::PersistentState;
use microcloud_unit::Host;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::commands;
use crate::config::Subsystem;
use crate::error::{AgentError, Result};
use crate::settings::AgentSettings;

/// Resource holding a `MicroCloud` snap.
pub const SNAP_RESOURCE: &str = "microcloud-snap";

/// Resource holding a `MicroCloud` binary.
pub const BINARY_RESOURCE: &str = "microcloud-binary";

/// Names an architecture may appear under in a tarball.
#[must_use]
pub fn architecture_aliases(architecture: &str) -> Vec<String> {
    match architecture {
        "x86_64" | "amd64" => vec!["x86_64".to_string(), "amd64".to_string()],
        "aarch64" | "arm64" => vec!["aarch64".to_string(), "arm64".to_string()],
        other => vec![other.to_string()],
    }
}

/// Whether `path` is a non-empty tar archive.
#[must_use]
pub fn is_tarball(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    if !file.metadata().is_ok_and(|metadata| metadata.len() > 0) {
        return false;
    }

    let mut archive = tar::Archive::new(file);
    archive
        .entries()
        .is_ok_and(|mut entries| matches!(entries.next(), Some(Ok(_))))
}

/// Unpacks the first member named in `names` into `dest`.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or the member cannot be
/// written.
pub fn extract_member(
    archive: &Path,
    names: &[String],
    dest: &Path,
) -> std::io::Result<Option<PathBuf>> {
    let mut archive = tar::Archive::new(File::open(archive)?);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let Some(name) = path.to_str() else {
            continue;
        };

        if names.iter().any(|candidate| candidate == name) {
            let target = dest.join(name);
            entry.unpack(&target)?;
            return Ok(Some(target));
        }
    }

    Ok(None)
}

/// A resolved artifact, plus the temporary directory it was unpacked into.
struct Artifact {
    path: PathBuf,
    _unpacked: Option<TempDir>,
}

impl Artifact {
    fn is_empty(&self) -> Result<bool> {
        let metadata = std::fs::metadata(&self.path)
            .map_err(failed("failed to stat sideloaded artifact"))?;
        Ok(metadata.len() == 0)
    }
}

/// Applies sideloaded resources.
pub struct Sideloader<'a, H, E> {
    host: &'a H,
    executor: &'a E,
    settings: &'a AgentSettings,
}

impl<'a, H, E> Sideloader<'a, H, E>
where
    H: Host,
    E: CommandExecutor,
{
    /// Creates a sideloader.
    pub const fn new(host: &'a H, executor: &'a E, settings: &'a AgentSettings) -> Self {
        Self {
            host,
            executor,
            settings,
        }
    }

    /// Applies the snap resource, then the binary resource.
    ///
    /// # Errors
    ///
    /// Returns failed commands and file errors.
    pub async fn sideload(&self, state: &mut PersistentState) -> Result<()> {
        self.sideload_snap(state).await?;
        self.sideload_binary(state).await
    }

    async fn sideload_snap(&self, state: &mut PersistentState) -> Result<()> {
        let Some(resource) = self.resource(SNAP_RESOURCE).await? else {
            return Ok(());
        };
        let Some(artifact) = self.resolve(&resource, ".snap")? else {
            return Ok(());
        };
        let timeout = self.settings.command_timeout;

        if artifact.is_empty()? {
            let channel = Subsystem::MicroCloud.channel(&state.config);
            info!("empty snap resource, reverting microcloud to {channel}");
            self.executor
                .run(&commands::snap_revert_microcloud(&channel), timeout)
                .await?;
            state.microcloud_snap_path = None;
        } else {
            info!("sideloading microcloud snap from {}", artifact.path.display());
            self.executor
                .run(&commands::snap_install_dangerous(&artifact.path), timeout)
                .await?;
            self.executor
                .run(&commands::enable_daemon_socket(), timeout)
                .await?;
            state.microcloud_snap_path = Some(resource);
        }

        Ok(())
    }

    async fn sideload_binary(&self, state: &mut PersistentState) -> Result<()> {
        let Some(resource) = self.resource(BINARY_RESOURCE).await? else {
            return Ok(());
        };
        let Some(artifact) = self.resolve(&resource, "")? else {
            return Ok(());
        };
        let target = &self.settings.debug_binary_path;

        if artifact.is_empty()? {
            info!("empty binary resource, removing {}", target.display());
            remove_if_exists(target)?;
            state.microcloud_binary_path = None;
        } else {
            info!("sideloading microcloud binary to {}", target.display());
            remove_if_exists(target)?;
            std::fs::copy(&artifact.path, target)
                .map_err(failed("failed to copy sideloaded binary"))?;
            std::fs::set_permissions(target, std::fs::Permissions::from_mode(0o755))
                .map_err(failed("failed to make sideloaded binary executable"))?;
            state.microcloud_binary_path = Some(resource);
        }

        self.reload_daemon().await
    }

    async fn reload_daemon(&self) -> Result<()> {
        let timeout = self.settings.command_timeout;

        if let Err(e) = self
            .executor
            .run(&commands::microcloud_waitready(), timeout)
            .await
        {
            debug!("daemon not ready before reload: {e}");
        }

        self.executor
            .run(&commands::reload_daemon(), timeout)
            .await?;

        Ok(())
    }

    async fn resource(&self, name: &str) -> Result<Option<PathBuf>> {
        self.host.resource(name).await.map_err(AgentError::host)
    }

    fn resolve(&self, resource: &Path, suffix: &str) -> Result<Option<Artifact>> {
        if !is_tarball(resource) {
            return Ok(Some(Artifact {
                path: resource.to_path_buf(),
                _unpacked: None,
            }));
        }

        let names: Vec<String> = architecture_aliases(&self.settings.architecture)
            .iter()
            .map(|arch| format!("microcloud_{arch}{suffix}"))
            .collect();

        let unpacked = tempfile::tempdir()
            .map_err(failed("failed to create unpack directory"))?;
        let member = extract_member(resource, &names, unpacked.path())
            .map_err(failed("failed to unpack sideload tarball"))?;

        Ok(member.map_or_else(
            || {
                warn!(
                    "{} has none of {}, ignoring it",
                    resource.display(),
                    names.join(", ")
                );
                None
            },
            |path| {
                Some(Artifact {
                    path,
                    _unpacked: Some(unpacked),
                })
            },
        ))
    }
}

fn failed(context: &'static str) -> impl FnOnce(std::io::Error) -> AgentError {
    move |e| AgentError::SideloadFailed(context, e)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(failed("failed to remove debug binary")(e)),
    }
}
